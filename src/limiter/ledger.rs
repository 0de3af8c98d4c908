//! Permit accounting for a single limiter instance.

/// Tracks consumed versus available capacity for one limiter.
///
/// The ledger itself is plain state: every limiter wraps it (together with
/// its wait queue) in a single mutex, so that capacity changes and queue
/// drains form one critical section and a release can never race an
/// enqueue into a lost wakeup.
#[derive(Debug)]
pub(crate) struct PermitLedger {
    /// Maximum permits that may be consumed at once
    limit: u32,
    /// Permits currently consumed
    consumed: u32,
}

impl PermitLedger {
    /// Create a ledger with the given permit limit.
    pub fn new(limit: u32) -> Self {
        Self { limit, consumed: 0 }
    }

    /// Attempt to consume `permits` units of capacity.
    ///
    /// Succeeds iff `consumed + permits <= limit`; on failure the ledger is
    /// left untouched.
    pub fn try_consume(&mut self, permits: u32) -> bool {
        match self.consumed.checked_add(permits) {
            Some(total) if total <= self.limit => {
                self.consumed = total;
                true
            }
            _ => false,
        }
    }

    /// Return `permits` units of capacity, floored at zero consumed.
    pub fn release(&mut self, permits: u32) {
        self.consumed = self.consumed.saturating_sub(permits);
    }

    /// The configured permit limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Permits currently consumed.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Permits currently available.
    pub fn available(&self) -> u32 {
        self.limit - self.consumed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_consume_within_limit() {
        let mut ledger = PermitLedger::new(10);

        assert!(ledger.try_consume(4));
        assert_eq!(ledger.consumed(), 4);
        assert_eq!(ledger.available(), 6);
    }

    #[test]
    fn test_consume_exactly_at_limit() {
        let mut ledger = PermitLedger::new(10);

        assert!(ledger.try_consume(10));
        assert_eq!(ledger.available(), 0);
        assert!(!ledger.try_consume(1));
    }

    #[test]
    fn test_failed_consume_has_no_effect() {
        let mut ledger = PermitLedger::new(5);

        ledger.try_consume(3);
        assert!(!ledger.try_consume(3));
        assert_eq!(ledger.consumed(), 3);
    }

    #[test]
    fn test_release_floors_at_zero() {
        let mut ledger = PermitLedger::new(5);

        ledger.try_consume(2);
        ledger.release(4);
        assert_eq!(ledger.consumed(), 0);
        assert_eq!(ledger.available(), 5);
    }

    #[test]
    fn test_consume_overflow_is_rejected() {
        let mut ledger = PermitLedger::new(u32::MAX);

        assert!(ledger.try_consume(u32::MAX));
        assert!(!ledger.try_consume(u32::MAX));
        assert_eq!(ledger.consumed(), u32::MAX);
    }

    #[test]
    fn test_zero_limit_always_rejects() {
        let mut ledger = PermitLedger::new(0);

        assert!(!ledger.try_consume(1));
        assert!(ledger.try_consume(0));
    }
}
