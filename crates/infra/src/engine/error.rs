use thiserror::Error;

use procureflow_core::{Amount, DomainError};

use crate::command_dispatcher::DispatchError;

pub type EngineResult<T> = Result<T, EngineError>;

/// Errors surfaced to callers of the procurement engine.
///
/// Every variant is recoverable at the call site. Messages name the rule that
/// was violated (which item, which field, which statuses).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// Another mutation of the same document is in flight, or a stale write lost the race.
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),

    /// The order needs an owner or manager before it can be placed.
    #[error("order {order_id} requires approval")]
    ApprovalRequired { order_id: String },

    /// Only raised when budget enforcement is switched on.
    #[error("budget exceeded for '{category}': projected {projected} against limit {limit}")]
    BudgetExceeded {
        category: String,
        projected: Amount,
        limit: Amount,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("incomplete receiving: {0}")]
    IncompleteReceiving(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("infrastructure failure: {0}")]
    Infrastructure(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(subject: impl Into<String>) -> Self {
        Self::NotFound(subject.into())
    }

    /// Name the missing document when the layer below only knew "not found".
    pub fn or_not_found(self, subject: impl core::fmt::Display) -> Self {
        match self {
            EngineError::NotFound(msg) if msg.is_empty() => EngineError::NotFound(subject.to_string()),
            other => other,
        }
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::Validation(msg),
            DomainError::InvalidTransition { from, to } => EngineError::InvalidTransition { from, to },
            DomainError::IncompleteReceiving(msg) => EngineError::IncompleteReceiving(msg),
            DomainError::Conflict(msg) => EngineError::ConcurrencyConflict(msg),
            DomainError::Unauthorized(msg) => EngineError::Unauthorized(msg),
            DomainError::NotFound => EngineError::NotFound(String::new()),
        }
    }
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => EngineError::ConcurrencyConflict(msg),
            DispatchError::Validation(msg) | DispatchError::InvariantViolation(msg) => {
                EngineError::Validation(msg)
            }
            DispatchError::InvalidTransition { from, to } => EngineError::InvalidTransition { from, to },
            DispatchError::IncompleteReceiving(msg) => EngineError::IncompleteReceiving(msg),
            DispatchError::Unauthorized(msg) => EngineError::Unauthorized(msg),
            DispatchError::NotFound => EngineError::NotFound(String::new()),
            DispatchError::BusinessIsolation(msg)
            | DispatchError::Deserialize(msg)
            | DispatchError::Publish(msg) => EngineError::Infrastructure(msg),
            DispatchError::Store(err) => EngineError::Infrastructure(err.to_string()),
        }
    }
}
