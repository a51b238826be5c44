//! Error types for backbeat

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Malformed composition buffer: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("Invalid composition: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
