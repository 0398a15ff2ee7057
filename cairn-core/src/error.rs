use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CairnError {
    #[error("Storage error: {0}")]
    Storage(rusqlite::Error),

    #[error("Transaction conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Whether a retry of the whole operation could succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, CairnError::Conflict(_))
    }
}

impl From<rusqlite::Error> for CairnError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
                CairnError::Conflict(err.to_string())
            }
            _ => CairnError::Storage(err),
        }
    }
}

impl From<tokio::task::JoinError> for CairnError {
    fn from(err: tokio::task::JoinError) -> Self {
        CairnError::Internal(format!("storage task failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, CairnError>;
