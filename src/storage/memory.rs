use super::{StorageBackend, StorageError, StoredImage};
use crate::filename::StoredFilename;
use async_trait::async_trait;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::atomic::{AtomicBool, Ordering},
    time::SystemTime,
};
use tokio::sync::RwLock;

struct MemoryObject {
    name: StoredFilename,
    bytes: Vec<u8>,
    modified: SystemTime,
}

/// In-process storage backend. Keeps insertion order for listings.
pub struct MemoryStorage {
    root: PathBuf,
    thumbnail_prefix: String,
    originals: RwLock<Vec<MemoryObject>>,
    thumbnails: RwLock<HashMap<StoredFilename, Vec<u8>>>,
    unavailable: AtomicBool,
}

impl MemoryStorage {
    pub fn new(thumbnail_prefix: impl Into<String>) -> Self {
        Self {
            root: PathBuf::from("memory"),
            thumbnail_prefix: thumbnail_prefix.into(),
            originals: RwLock::new(Vec::new()),
            thumbnails: RwLock::new(HashMap::new()),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent operation fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn original(&self, name: &StoredFilename) -> Option<Vec<u8>> {
        self.originals
            .read()
            .await
            .iter()
            .find(|object| &object.name == name)
            .map(|object| object.bytes.clone())
    }

    pub async fn thumbnail(&self, original: &StoredFilename) -> Option<Vec<u8>> {
        self.thumbnails.read().await.get(original).cloned()
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("thumb_")
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    async fn store(&self, name: &StoredFilename, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        self.check_available()?;
        let mut originals = self.originals.write().await;
        if originals.iter().any(|object| &object.name == name) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        originals.push(MemoryObject {
            name: name.clone(),
            bytes: bytes.to_vec(),
            modified: SystemTime::now(),
        });
        Ok(self.root.join(name))
    }

    async fn store_thumbnail(
        &self,
        original: &StoredFilename,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.check_available()?;
        let thumb = original.thumbnail(&self.thumbnail_prefix)?;
        self.thumbnails
            .write()
            .await
            .insert(original.clone(), bytes.to_vec());
        Ok(self.root.join("thumbnails").join(thumb))
    }

    async fn list(&self) -> Result<Vec<StoredImage>, StorageError> {
        self.check_available()?;
        let originals = self.originals.read().await;
        let thumbnails = self.thumbnails.read().await;

        Ok(originals
            .iter()
            .map(|object| StoredImage {
                name: object.name.clone(),
                size: object.bytes.len() as u64,
                modified: object.modified,
                has_thumbnail: thumbnails.contains_key(&object.name),
            })
            .collect())
    }

    async fn delete(&self, name: &StoredFilename) -> Result<bool, StorageError> {
        self.check_available()?;
        let mut originals = self.originals.write().await;
        let before = originals.len();
        originals.retain(|object| &object.name != name);
        self.thumbnails.write().await.remove(name);
        Ok(originals.len() != before)
    }

    fn upload_root(&self) -> &Path {
        &self.root
    }

    fn thumbnail_prefix(&self) -> &str {
        &self.thumbnail_prefix
    }

    fn name(&self) -> &str {
        "memory"
    }
}
