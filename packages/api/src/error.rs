//! Error type for the in-process API.

use crate::logs::CursorId;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors returned by the API facade.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Supervisor not available")]
    SupervisorUnavailable,

    #[error("Failed to send message: {0}")]
    Send(String),

    #[error("Failed to receive response")]
    NoResponse,

    #[error("Cursor not found: {0}")]
    CursorNotFound(CursorId),

    #[error("Coordinator error: {0}")]
    Coordinator(String),

    #[error("Startup failed: {0}")]
    Startup(String),

    #[error("Database error: {0}")]
    Database(#[from] db::DbError),
}

impl From<String> for ApiError {
    fn from(message: String) -> Self {
        ApiError::Coordinator(message)
    }
}
