//! Error taxonomy for the hedging engine.
//!
//! `EngineError` is the crate-wide error type. Recoverable order-lifecycle
//! failures are modeled separately as `OrderError` so the HedgePlan's retry
//! logic can match on them without downcasting; they convert into
//! `EngineError` at the boundary where they leave the engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("unexpected state: {0}")]
    UnexpectedState(String),

    #[error("quote unavailable for token {token_id}")]
    QuoteUnavailable { token_id: String },

    #[error("order submission failed: {0}")]
    OrderSubmission(String),

    #[error("order timed out after {elapsed_ms}ms")]
    OrderTimeout { elapsed_ms: u64 },

    #[error("order rejected: {0}")]
    OrderRejected(String),

    #[error("risk limit exceeded: {0}")]
    RiskLimitExceeded(String),

    #[error("command queue saturated: {0}")]
    QueueSaturated(String),

    #[error("component failure in {component}: {reason}")]
    ComponentFailure { component: String, reason: String },

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

/// Retryable, exchange-level failures surfaced by the Command Executor and
/// consumed by the HedgePlan's backoff bookkeeping. Kept separate from
/// `EngineError` (and `Clone`) so a plan can store its `lastError` without
/// needing to clone an opaque `anyhow` chain.
#[derive(Debug, Clone, Error)]
pub enum OrderError {
    #[error("order {order_id} not found")]
    NotFound { order_id: String },

    #[error("order already filled")]
    AlreadyFilled,

    #[error("order already cancelled")]
    AlreadyCancelled,

    #[error("partial fill: requested {requested}, filled {filled}")]
    PartialFill { requested: u64, filled: u64 },

    #[error("slippage exceeded: limit {limit}, actual {actual}")]
    SlippageExceeded { limit: String, actual: String },

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("max retries exceeded after {attempts} attempts")]
    MaxRetriesExceeded { attempts: u32 },

    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<OrderError> for EngineError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Timeout { elapsed_ms } => EngineError::OrderTimeout { elapsed_ms },
            OrderError::Rejected(msg) => EngineError::OrderRejected(msg),
            other => EngineError::OrderSubmission(other.to_string()),
        }
    }
}
