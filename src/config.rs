//! Policy configuration for Turnstile limiters.
//!
//! Each limiter variant has its own plain configuration structure, combined
//! under the tagged [`LimiterConfig`] enum. A [`RegistryConfig`] groups named
//! policies and can be loaded from a YAML file, so a whole policy set can be
//! declared in configuration rather than code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};
use crate::limiter::QueueOrder;

/// Default rejection code attached to a policy when none is configured.
const DEFAULT_REJECTION_CODE: u32 = 429;

/// Configuration for a concurrency limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Maximum number of permits held concurrently (0 = always reject)
    pub permit_limit: u32,
    /// Maximum number of queued acquisitions (0 = no queuing)
    #[serde(default)]
    pub queue_limit: usize,
    /// Order in which queued acquisitions are granted
    #[serde(default)]
    pub queue_order: QueueOrder,
}

/// Configuration for a fixed window limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedWindowConfig {
    /// Maximum number of permits granted per window (0 = always reject)
    pub permit_limit: u32,
    /// Window duration in milliseconds
    pub window_ms: u64,
    /// Maximum number of queued acquisitions (0 = no queuing)
    #[serde(default)]
    pub queue_limit: usize,
    /// Order in which queued acquisitions are granted
    #[serde(default)]
    pub queue_order: QueueOrder,
}

/// Configuration for a sliding window limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Maximum number of permits granted per trailing window (0 = always reject)
    pub permit_limit: u32,
    /// Window duration in milliseconds
    pub window_ms: u64,
    /// Number of segments the window is divided into (must be >= 1)
    pub segments_per_window: u32,
    /// Maximum number of queued acquisitions (0 = no queuing)
    #[serde(default)]
    pub queue_limit: usize,
    /// Order in which queued acquisitions are granted
    #[serde(default)]
    pub queue_order: QueueOrder,
}

/// Configuration for a token bucket limiter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenBucketConfig {
    /// Maximum number of tokens the bucket can hold (0 = always reject)
    pub token_limit: u32,
    /// Replenishment period in milliseconds
    pub replenishment_period_ms: u64,
    /// Tokens added to the bucket per replenishment period
    pub tokens_per_period: u32,
    /// Whether a background timer performs replenishment; when false,
    /// replenishment happens only through an explicit `try_replenish` call
    #[serde(default = "default_auto_replenishment")]
    pub auto_replenishment: bool,
    /// Maximum number of queued acquisitions (0 = no queuing)
    #[serde(default)]
    pub queue_limit: usize,
    /// Order in which queued acquisitions are granted
    #[serde(default)]
    pub queue_order: QueueOrder,
}

fn default_auto_replenishment() -> bool {
    true
}

impl ConcurrencyConfig {
    /// Validate the configuration. No additional constraints: a zero
    /// `permit_limit` is legal and means "always reject new work".
    pub fn validate(&self) -> Result<()> {
        Ok(())
    }
}

impl FixedWindowConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "fixed window duration must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Window duration.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

impl SlidingWindowConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(TurnstileError::Config(
                "sliding window duration must be greater than zero".to_string(),
            ));
        }
        if self.segments_per_window == 0 {
            return Err(TurnstileError::Config(
                "segments_per_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Full window duration.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Duration covered by a single segment.
    pub fn segment_duration(&self) -> Duration {
        Duration::from_millis(self.window_ms / u64::from(self.segments_per_window))
    }
}

impl TokenBucketConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.replenishment_period_ms == 0 {
            return Err(TurnstileError::Config(
                "replenishment period must be greater than zero".to_string(),
            ));
        }
        if self.tokens_per_period == 0 {
            return Err(TurnstileError::Config(
                "tokens_per_period must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Replenishment period.
    pub fn replenishment_period(&self) -> Duration {
        Duration::from_millis(self.replenishment_period_ms)
    }
}

/// Configuration for a single limiter, tagged by algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum LimiterConfig {
    /// Bound the number of requests executing at once
    Concurrency(ConcurrencyConfig),
    /// Bound the number of requests per fixed time window
    FixedWindow(FixedWindowConfig),
    /// Bound the number of requests per trailing time window
    SlidingWindow(SlidingWindowConfig),
    /// Spend tokens that refill on a schedule, up to a cap
    TokenBucket(TokenBucketConfig),
}

impl LimiterConfig {
    /// Validate the variant-specific constraints.
    pub fn validate(&self) -> Result<()> {
        match self {
            LimiterConfig::Concurrency(c) => c.validate(),
            LimiterConfig::FixedWindow(c) => c.validate(),
            LimiterConfig::SlidingWindow(c) => c.validate(),
            LimiterConfig::TokenBucket(c) => c.validate(),
        }
    }
}

/// A named policy: a limiter configuration plus the opaque rejection code
/// the request pipeline surfaces when this policy rejects a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Opaque code surfaced to the pipeline on rejection
    #[serde(default = "default_rejection_code")]
    pub rejection_code: u32,
    /// The limiter algorithm and its parameters
    #[serde(flatten)]
    pub limiter: LimiterConfig,
}

fn default_rejection_code() -> u32 {
    DEFAULT_REJECTION_CODE
}

impl From<LimiterConfig> for PolicyConfig {
    fn from(limiter: LimiterConfig) -> Self {
        Self {
            rejection_code: DEFAULT_REJECTION_CODE,
            limiter,
        }
    }
}

/// A full registry configuration containing named policies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Map of policy name to policy configuration
    #[serde(default)]
    pub policies: HashMap<String, PolicyConfig>,
}

impl RegistryConfig {
    /// Create an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading limiter policy configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse policy config: {}", e)))
    }
}
