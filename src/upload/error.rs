use super::{RejectedFile, UploadErrorBody};
use crate::filename::FilenameError;
use crate::storage::StorageError;
use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("No files uploaded")]
    NoFiles,

    #[error("Too many files: at most {0} per upload")]
    TooManyFiles(usize),

    #[error("No valid image files uploaded")]
    NothingAccepted(Vec<RejectedFile>),

    #[error("Invalid grouping token: {0}")]
    InvalidGroup(FilenameError),

    #[error("Malformed upload: {0}")]
    NotMultipart(#[from] MultipartRejection),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Upload failed: {0}")]
    Storage(#[from] StorageError),
}

impl UploadError {
    pub fn status(&self) -> StatusCode {
        match self {
            UploadError::NoFiles
            | UploadError::TooManyFiles(_)
            | UploadError::NothingAccepted(_)
            | UploadError::InvalidGroup(_) => StatusCode::BAD_REQUEST,
            UploadError::NotMultipart(rejection) => rejection.status(),
            UploadError::Multipart(e) => e.status(),
            UploadError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = self.to_string();
        let rejected = match self {
            UploadError::NothingAccepted(rejected) => rejected,
            _ => Vec::new(),
        };

        (status, Json(UploadErrorBody { error, rejected })).into_response()
    }
}
