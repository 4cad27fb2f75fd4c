use super::{DeleteResponse, GalleryError, ListingResponse};
use crate::AppState;
use crate::filename::StoredFilename;
use axum::{
    Json,
    extract::{Path, State},
};
use tracing::{error, warn};

pub async fn list_images_handler(
    State(app_state): State<AppState>,
) -> Result<Json<ListingResponse>, GalleryError> {
    let images = app_state
        .gallery
        .list_images()
        .await
        .inspect_err(|e| error!("Error getting images: {}", e))?;

    Ok(Json(ListingResponse { images }))
}

pub async fn delete_image_handler(
    State(app_state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Json<DeleteResponse>, GalleryError> {
    let name = StoredFilename::parse(filename.as_str()).inspect_err(|e| {
        warn!("Refusing to delete {:?}: {}", filename, e);
    })?;

    app_state
        .gallery
        .delete_image(&name)
        .await
        .inspect_err(|e| error!("Delete error: {}", e))?;

    Ok(Json(DeleteResponse {
        success: true,
        message: "Image deleted successfully".to_string(),
    }))
}
