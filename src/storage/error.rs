use crate::filename::FilenameError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid name: {0}")]
    InvalidName(#[from] FilenameError),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Storage unavailable")]
    Unavailable,
}
