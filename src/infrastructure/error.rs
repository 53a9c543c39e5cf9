use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Please login to perform this action")]
    Unauthenticated,
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Conflict(String),
    #[error("Password hashing error: {0}")]
    Password(String),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Background task failed: {0}")]
    Join(String),
    #[error("Session store unavailable: {0}")]
    SessionStore(String),
}

/// Caller-facing classification of an [`InfraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthenticated,
    Conflict,
    Storage,
}

impl InfraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthenticated | Self::InvalidCredentials => ErrorKind::Unauthenticated,
            Self::Conflict(_) => ErrorKind::Conflict,
            _ => ErrorKind::Storage,
        }
    }

    pub fn task_not_found() -> Self {
        Self::NotFound("Task not found or access denied".to_string())
    }
}

impl From<tokio::task::JoinError> for InfraError {
    fn from(error: tokio::task::JoinError) -> Self {
        Self::Join(error.to_string())
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}
