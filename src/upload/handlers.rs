use super::{IncomingFile, UploadBatch, UploadError, UploadIntake, UploadResponse};
use crate::{AppState, UploadConfig, filename::GroupToken};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::MultipartRejection,
    },
};
use tracing::{debug, error};

pub async fn upload_handler(
    State(app_state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResponse>, UploadError> {
    let mut multipart = multipart?;

    let batch = read_batch(&app_state.config.upload, &app_state.intake, &mut multipart)
        .await
        .inspect_err(|e| error!("Upload rejected: {}", e))?;

    let response = app_state
        .intake
        .ingest(batch)
        .await
        .inspect_err(|e| error!("Upload error: {}", e))?;

    Ok(Json(response))
}

/// Read every part of the form into a batch without storing anything.
///
/// Non-image parts are skipped unread and oversized parts are drained but not
/// buffered, so neither can exhaust memory.
async fn read_batch(
    config: &UploadConfig,
    intake: &UploadIntake,
    multipart: &mut Multipart,
) -> Result<UploadBatch, UploadError> {
    let mut batch = UploadBatch::default();
    let mut file_count = 0usize;

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().unwrap_or_default().to_string();

        if field_name == config.group_field {
            let token = field.text().await?;
            let token = token.trim();
            if !token.is_empty() {
                batch.group = Some(GroupToken::parse(token).map_err(UploadError::InvalidGroup)?);
            }
            continue;
        }

        if field_name != config.file_field {
            debug!("Ignoring unexpected multipart field {:?}", field_name);
            continue;
        }

        file_count += 1;
        if file_count > intake.max_files() {
            return Err(UploadError::TooManyFiles(intake.max_files()));
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let mime_type = field.content_type().map(str::to_string);

        if let Err(rejected) = intake.validate(&original_name, mime_type.as_deref(), None) {
            batch.entries.push(Err(rejected));
            continue;
        }

        let mut bytes = Vec::new();
        let mut size = 0u64;
        while let Some(chunk) = field.chunk().await? {
            size += chunk.len() as u64;
            if size > intake.max_file_size() {
                bytes = Vec::new();
            } else {
                bytes.extend_from_slice(&chunk);
            }
        }

        if let Err(rejected) = intake.validate(&original_name, mime_type.as_deref(), Some(size)) {
            batch.entries.push(Err(rejected));
            continue;
        }

        batch.entries.push(Ok(IncomingFile {
            original_name,
            mime_type: mime_type.unwrap_or_default(),
            bytes,
        }));
    }

    Ok(batch)
}
