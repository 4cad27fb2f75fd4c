use super::{RejectedFile, UploadError, UploadResponse, UploadedFile};
use crate::UploadConfig;
use crate::filename::{GroupToken, StoredFilename};
use crate::post_process::{PostProcessJob, PostProcessor};
use crate::storage::{self, DynStorage, StorageError};
use crate::thumbnail::ThumbnailGenerator;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Attempts at finding an unused generated name before giving up.
const NAME_ATTEMPTS: usize = 3;

pub type SharedIntake = Arc<UploadIntake>;

/// A file part read from the request, not yet validated or stored.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// One submitted file: either read in full, or already rejected while reading.
pub type BatchEntry = Result<IncomingFile, RejectedFile>;

#[derive(Debug, Default)]
pub struct UploadBatch {
    pub entries: Vec<BatchEntry>,
    pub group: Option<GroupToken>,
}

pub struct UploadIntake {
    storage: DynStorage,
    thumbnails: ThumbnailGenerator,
    post_processor: PostProcessor,
    max_files: usize,
    max_file_size: u64,
    name_prefix: String,
}

impl UploadIntake {
    pub fn new(
        storage: DynStorage,
        thumbnails: ThumbnailGenerator,
        post_processor: PostProcessor,
        config: &UploadConfig,
    ) -> Self {
        Self {
            storage,
            thumbnails,
            post_processor,
            max_files: config.max_files.max(1),
            max_file_size: config.max_file_size,
            name_prefix: config.file_field.clone(),
        }
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Check a file's declared MIME type and, once known, its size.
    pub fn validate(
        &self,
        original_name: &str,
        mime_type: Option<&str>,
        size: Option<u64>,
    ) -> Result<(), RejectedFile> {
        let reason = if !mime_type.is_some_and(|mime| mime.starts_with("image/")) {
            "Only image files are allowed".to_string()
        } else if size.is_some_and(|size| size > self.max_file_size) {
            format!("File exceeds the {} byte size limit", self.max_file_size)
        } else {
            return Ok(());
        };

        Err(RejectedFile {
            original_name: original_name.to_string(),
            mime_type: mime_type.map(str::to_string),
            reason,
        })
    }

    /// Store every valid file, generate thumbnails, and hand the batch to post-processing.
    pub async fn ingest(&self, batch: UploadBatch) -> Result<UploadResponse, UploadError> {
        if batch.entries.is_empty() {
            return Err(UploadError::NoFiles);
        }
        if batch.entries.len() > self.max_files {
            return Err(UploadError::TooManyFiles(self.max_files));
        }

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for entry in batch.entries {
            let checked = entry.and_then(|file| {
                self.validate(
                    &file.original_name,
                    Some(file.mime_type.as_str()),
                    Some(file.bytes.len() as u64),
                )
                .map(|()| file)
            });
            match checked {
                Ok(file) => accepted.push(file),
                Err(rejection) => {
                    warn!(
                        "Rejected {:?} ({:?}): {}",
                        rejection.original_name, rejection.mime_type, rejection.reason
                    );
                    rejected.push(rejection);
                }
            }
        }

        if accepted.is_empty() {
            return Err(UploadError::NothingAccepted(rejected));
        }

        debug!("Received grouping token: {:?}", batch.group);

        let prefix = self.storage.thumbnail_prefix().to_string();
        let mut files = Vec::with_capacity(accepted.len());
        let mut stored_names = Vec::with_capacity(accepted.len());

        for IncomingFile {
            original_name,
            mime_type,
            bytes,
        } in accepted
        {
            let size = bytes.len() as u64;
            let name = match self.store_unique(&original_name, &bytes).await {
                Ok(name) => name,
                Err(e) => {
                    self.discard(&stored_names).await;
                    return Err(e.into());
                }
            };

            let (thumbnail_path, thumbnail_error) = match self
                .thumbnails
                .generate(self.storage.as_ref(), &name, bytes)
                .await
            {
                Ok(_) => (Some(storage::thumbnail_url(&prefix, &name)), false),
                Err(e) => {
                    warn!("Error generating thumbnail for {}: {}", name, e);
                    (None, true)
                }
            };

            files.push(UploadedFile {
                filename: name.to_string(),
                original_name,
                size,
                mime_type,
                upload_path: storage::upload_url(&name),
                thumbnail_path,
                thumbnail_error,
            });
            stored_names.push(name);
        }

        info!(
            "Stored {} file(s), rejected {} via {} storage",
            files.len(),
            rejected.len(),
            self.storage.name()
        );

        self.post_processor.trigger(PostProcessJob {
            target: self.storage.upload_root().to_path_buf(),
            group: batch.group,
            files: stored_names,
        });

        Ok(UploadResponse {
            success: true,
            message: format!("{} file(s) uploaded successfully", files.len()),
            files,
            rejected,
        })
    }

    /// Remove files already stored for a batch that is failing as a whole.
    async fn discard(&self, names: &[StoredFilename]) {
        for name in names {
            match self.storage.delete(name).await {
                Ok(_) => debug!("Rolled back {}", name),
                Err(e) => warn!("Failed to roll back {}: {}", name, e),
            }
        }
    }

    async fn store_unique(
        &self,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<StoredFilename, StorageError> {
        let mut last_error = None;
        for _ in 0..NAME_ATTEMPTS {
            let name = StoredFilename::generate(&self.name_prefix, original_name);
            match self.storage.store(&name, bytes).await {
                Ok(path) => {
                    debug!("Stored {:?} as {:?}", original_name, path);
                    return Ok(name);
                }
                Err(StorageError::AlreadyExists(existing)) => {
                    debug!("Generated name {} already taken, retrying", existing);
                    last_error = Some(StorageError::AlreadyExists(existing));
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or(StorageError::Unavailable))
    }
}
