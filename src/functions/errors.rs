use crate::hashing::Error as HashingError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PseudonymizeError {
    #[error("Internal error: {}", .0.to_lowercase())]
    InternalError(String),

    #[error("Invalid input: {}", .0.to_lowercase())]
    InvalidInput(String),
}

impl From<HashingError> for PseudonymizeError {
    fn from(err: HashingError) -> Self {
        PseudonymizeError::InternalError(format!("{err}"))
    }
}
