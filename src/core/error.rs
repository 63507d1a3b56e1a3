//! Error types for reservation and dispatch operations.

use thiserror::Error;

/// Errors produced by the registration store and reservation engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Holder or resource does not exist.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind (`student` or `skill`).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },
    /// The named skill has no remaining capacity.
    #[error("skill {0} is full")]
    CapacityExceeded(String),
    /// The requested selection is malformed (empty or repeated codes).
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    /// A capacity change would drop a limit below what is already taken.
    #[error("invalid limit: {0}")]
    InvalidLimit(String),
    /// Email already belongs to another student.
    #[error("email already in use by another student")]
    EmailInUse,
    /// Email was verified earlier; no new code is issued.
    #[error("email already verified")]
    EmailAlreadyVerified,
    /// Backend-specific failure with context.
    #[error("store error: {0}")]
    Store(String),
    /// Configuration could not be loaded or is invalid.
    #[error("config error: {0}")]
    Config(String),
}

impl RegistryError {
    /// Shorthand for a missing student.
    pub fn student_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "student",
            id: id.into(),
        }
    }

    /// Shorthand for a missing skill.
    pub fn skill_not_found(code: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "skill",
            id: code.into(),
        }
    }
}

/// Errors produced by the dispatch governor.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// No transport credentials are configured; nothing is sent.
    #[error("mail transport disabled")]
    TransportDisabled,
    /// Retryable transport failure that exhausted the retry budget.
    #[error("transient send failure after {attempts} attempt(s): {message}")]
    TransientSendFailure {
        /// Attempts that reached the transport.
        attempts: u32,
        /// Last transport error text.
        message: String,
    },
    /// Provider kept signalling throttling after the long backoff.
    #[error("rate limited after {attempts} attempt(s): {message}")]
    RateLimited {
        /// Attempts that reached the transport.
        attempts: u32,
        /// Last transport error text.
        message: String,
    },
    /// Non-retryable transport failure.
    #[error("permanent send failure: {0}")]
    PermanentSendFailure(String),
    /// The send queue has no room left.
    #[error("send queue full")]
    QueueFull,
    /// The dispatch worker has stopped.
    #[error("send queue closed")]
    QueueClosed,
    /// The request could not be turned into a deliverable message.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
