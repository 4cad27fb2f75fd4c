use serde::Serialize;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Manifest entry for one stored file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub filename: String,
    pub original_name: String,
    pub size: u64,
    pub mime_type: String,
    pub upload_path: String,
    pub thumbnail_path: Option<String>,
    #[serde(skip_serializing_if = "is_false")]
    pub thumbnail_error: bool,
}

/// A file that failed validation and was never written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedFile {
    pub original_name: String,
    pub mime_type: Option<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub message: String,
    pub files: Vec<UploadedFile>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedFile>,
}
