//! Error types for the Turnstile library.

use thiserror::Error;

/// Main error type for Turnstile operations.
///
/// Errors are only produced at configuration/registration time or when a
/// policy lookup fails. Request-time rejections are never errors; they are
/// surfaced as ungranted [`Lease`](crate::limiter::Lease) values.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors (invalid limits, bad config files)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup of a policy name that was never registered
    #[error("Unknown policy: {0}")]
    UnknownPolicy(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
