// Storage module - where uploaded originals and their thumbnails live
mod disk;
mod error;
mod memory;

pub use disk::DiskStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;

use crate::filename::StoredFilename;
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

/// An original as seen by a listing, with thumbnail presence checked separately.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub name: StoredFilename,
    pub size: u64,
    pub modified: SystemTime,
    pub has_thumbnail: bool,
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Persist an original. Fails with `AlreadyExists` rather than overwriting.
    async fn store(&self, name: &StoredFilename, bytes: &[u8]) -> Result<PathBuf, StorageError>;

    /// Persist (or replace) the thumbnail belonging to `original`.
    async fn store_thumbnail(
        &self,
        original: &StoredFilename,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError>;

    /// Top-level originals in enumeration order.
    async fn list(&self) -> Result<Vec<StoredImage>, StorageError>;

    /// Remove an original and its thumbnail. Returns whether the original existed.
    async fn delete(&self, name: &StoredFilename) -> Result<bool, StorageError>;

    /// Directory holding the originals.
    fn upload_root(&self) -> &Path;

    fn thumbnail_prefix(&self) -> &str;

    fn name(&self) -> &str;
}

pub type DynStorage = Arc<dyn StorageBackend>;

/// Public URL path of a stored original.
pub fn upload_url(name: &StoredFilename) -> String {
    format!("{}/{}", crate::UPLOADS_ROUTE, name)
}

/// Public URL path of the thumbnail belonging to `name`.
pub fn thumbnail_url(prefix: &str, name: &StoredFilename) -> String {
    format!("{}/{}{}", crate::THUMBNAILS_ROUTE, prefix, name)
}
