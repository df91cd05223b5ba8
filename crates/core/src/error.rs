use thiserror::Error;

pub type UpliftResult<T> = Result<T, UpliftError>;

#[derive(Error, Debug)]
pub enum UpliftError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Allocation error: {0}")]
    Allocation(String),

    #[error("Statistical error: {0}")]
    Statistical(String),

    #[error("Version conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
