use super::{StorageBackend, StorageError, StoredImage};
use crate::filename::StoredFilename;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Originals and thumbnails kept as plain files in two sibling directories.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    upload_dir: PathBuf,
    thumbnail_dir: PathBuf,
    thumbnail_prefix: String,
}

impl DiskStorage {
    pub fn new(upload_dir: PathBuf, thumbnail_dir: PathBuf, thumbnail_prefix: String) -> Self {
        Self {
            upload_dir,
            thumbnail_dir,
            thumbnail_prefix,
        }
    }

    fn thumbnail_path(&self, original: &StoredFilename) -> Result<PathBuf, StorageError> {
        let thumb = original.thumbnail(&self.thumbnail_prefix)?;
        Ok(self.thumbnail_dir.join(thumb))
    }
}

/// Remove a file, treating absence as success. Returns whether it existed.
async fn remove_if_present(path: &Path) -> Result<bool, StorageError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Map `NotFound` to `None`, leaving other IO errors as failures.
fn present<T>(result: std::io::Result<T>) -> Result<Option<T>, StorageError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl StorageBackend for DiskStorage {
    async fn store(&self, name: &StoredFilename, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.upload_dir.join(name);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let written = match file.write_all(bytes).await {
            Ok(()) => file.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            drop(file);
            if let Err(cleanup) = remove_if_present(&path).await {
                warn!("Failed to remove partial file {:?}: {}", path, cleanup);
            }
            return Err(e.into());
        }

        debug!("Stored {} ({} bytes) at {:?}", name, bytes.len(), path);
        Ok(path)
    }

    async fn store_thumbnail(
        &self,
        original: &StoredFilename,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        let path = self.thumbnail_path(original)?;
        tokio::fs::write(&path, bytes).await?;
        debug!("Stored thumbnail for {} at {:?}", original, path);
        Ok(path)
    }

    async fn list(&self) -> Result<Vec<StoredImage>, StorageError> {
        let mut images = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.upload_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }

            let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
                debug!("Skipping non UTF-8 filename {:?}", entry.file_name());
                continue;
            };
            let name = match StoredFilename::parse(file_name) {
                Ok(name) => name,
                Err(e) => {
                    debug!("Skipping {:?}: {}", entry.file_name(), e);
                    continue;
                }
            };

            // Removed by a concurrent delete since read_dir returned it
            let Some(metadata) = present(entry.metadata().await)? else {
                debug!("Skipping {} removed during listing", name);
                continue;
            };
            let has_thumbnail = tokio::fs::try_exists(self.thumbnail_path(&name)?).await?;

            images.push(StoredImage {
                name,
                size: metadata.len(),
                modified: metadata.modified()?,
                has_thumbnail,
            });
        }

        Ok(images)
    }

    async fn delete(&self, name: &StoredFilename) -> Result<bool, StorageError> {
        let existed = remove_if_present(&self.upload_dir.join(name)).await?;
        let had_thumbnail = remove_if_present(&self.thumbnail_path(name)?).await?;

        info!(
            "Deleted {} (original present: {}, thumbnail present: {})",
            name, existed, had_thumbnail
        );
        Ok(existed)
    }

    fn upload_root(&self) -> &Path {
        &self.upload_dir
    }

    fn thumbnail_prefix(&self) -> &str {
        &self.thumbnail_prefix
    }

    fn name(&self) -> &str {
        "disk"
    }
}
