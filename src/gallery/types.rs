use chrono::{DateTime, Utc};
use serde::Serialize;

/// A stored image as reported by the listing endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GalleryEntry {
    pub filename: String,
    pub upload_path: String,
    pub thumbnail_path: Option<String>,
    pub size: u64,
    pub upload_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListingResponse {
    pub images: Vec<GalleryEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GalleryErrorBody {
    pub error: String,
}
