use super::GalleryErrorBody;
use crate::filename::FilenameError;
use crate::storage::StorageError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Failed to get images: {0}")]
    ListingError(#[source] StorageError),

    #[error("Failed to delete image: {0}")]
    DeletionError(#[source] StorageError),

    #[error("Invalid filename: {0}")]
    InvalidFilename(#[from] FilenameError),
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        // Storage details stay in the log; clients get a generic message
        let (status, error) = match &self {
            GalleryError::ListingError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to get images".to_string(),
            ),
            GalleryError::DeletionError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to delete image".to_string(),
            ),
            GalleryError::InvalidFilename(_) => (StatusCode::BAD_REQUEST, self.to_string()),
        };

        (status, Json(GalleryErrorBody { error })).into_response()
    }
}
