use thiserror::Error;

/// Canonical error type for aging-test collaborators and orchestration.
#[derive(Debug, Error)]
pub enum AgingError {
    /// Entity was not found on the target system.
    #[error("{entity} `{id}` was not found")]
    NotFound {
        /// Entity kind name (e.g. `"partner"`).
        entity: &'static str,
        /// Identifier of the missing entity.
        id: String,
    },

    /// Target system answered with a non-success status.
    #[error("request rejected with status {status}: {message}")]
    Rejected {
        /// Status code reported by the target.
        status: u16,
        /// Body or reason text returned by the target.
        message: String,
    },

    /// Request never produced a response (connect, timeout, decode).
    #[error("transport error: {0}")]
    Transport(String),

    /// Login or session setup failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Operation violates current state machine rules.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Human-readable explanation of the invalid state.
        message: String,
    },

    /// Validation error for input data.
    #[error("validation error: {0}")]
    Validation(String),

    /// I/O error occurred while writing reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unexpected internal error occurred.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable details for debugging purposes.
        message: String,
    },
}

impl AgingError {
    /// Creates a `NotFound` variant.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Creates a `Rejected` variant.
    #[must_use]
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Creates an `InvalidState` variant.
    #[must_use]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an `Internal` variant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for AgingError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Convenient result alias for aging-test operations.
pub type AgingResult<T> = Result<T, AgingError>;
