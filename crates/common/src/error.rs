use thiserror::Error;

/// Failure taxonomy for the pipeline. Only `Config` is fatal; every other
/// variant leaves the owning loop alive.
#[derive(Debug, Error)]
pub enum BotError {
    /// Store or bus temporarily unavailable. Retried, never crashes a loop.
    #[error("transient I/O failure: {0}")]
    TransientIo(String),

    /// The rolling window does not yet hold enough points. The cycle waits.
    #[error("insufficient data: window holds {have} of {need} points")]
    InsufficientData { have: usize, need: usize },

    /// A signal with the same idempotency key already exists. Absorbed.
    #[error("duplicate signal {0}")]
    DuplicateSignal(String),

    #[error("insufficient {asset} balance: free {free}, required {required}")]
    InsufficientFunds {
        asset: String,
        free: f64,
        required: f64,
    },

    /// The exchange refused a request. The signal stays pending for retry.
    #[error("exchange rejected request: {0}")]
    ExchangeRejection(String),

    /// Another worker holds the lease. Expected concurrency, not an error.
    #[error("lease on {0} held by another worker")]
    LeaseContention(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
