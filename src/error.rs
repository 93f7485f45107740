use thiserror::Error;

/// Error type for the relay service.
///
/// Only the lifecycle endpoints and startup surface these; the signaling
/// relay itself absorbs every failure.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Lifecycle request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Live session {0} not found")]
    SessionNotFound(String),

    /// Storage errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Stored record is corrupt: {0}")]
    CorruptRecord(String),

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Convenience type alias for Results using RelayError
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        RelayError::InvalidRequest(msg.into())
    }

    /// HTTP status code returned for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            RelayError::InvalidRequest(_) => 400,
            RelayError::SessionNotFound(_) => 404,
            RelayError::Database(_)
            | RelayError::Migration(_)
            | RelayError::CorruptRecord(_)
            | RelayError::InvalidConfiguration(_) => 500,
        }
    }

    /// Stable machine-readable code for the JSON error body.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "INVALID_REQUEST",
            RelayError::SessionNotFound(_) => "NOT_FOUND",
            RelayError::Database(_) | RelayError::Migration(_) | RelayError::CorruptRecord(_) => {
                "DATABASE_ERROR"
            }
            RelayError::InvalidConfiguration(_) => "INTERNAL_ERROR",
        }
    }

    /// Message safe to return to a client. Storage and internal details stay in the logs.
    pub fn client_message(&self) -> String {
        match self {
            RelayError::InvalidRequest(_) | RelayError::SessionNotFound(_) => self.to_string(),
            RelayError::Database(_) | RelayError::Migration(_) | RelayError::CorruptRecord(_) => {
                "An internal database error occurred".to_string()
            }
            RelayError::InvalidConfiguration(_) => "An internal error occurred".to_string(),
        }
    }
}

impl warp::reject::Reject for RelayError {}
