use super::*;
use crate::filename::{GroupToken, StoredFilename};
use crate::post_process::PostProcessor;
use crate::storage::{MemoryStorage, StorageBackend, StorageError, StoredImage};
use crate::thumbnail::ThumbnailGenerator;
use crate::{ThumbnailConfig, UploadConfig};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use async_trait::async_trait;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn png_bytes(seed: u8) -> Vec<u8> {
    let img = ImageBuffer::from_fn(60, 40, |x, y| Rgb([x as u8, y as u8, seed]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

fn incoming(name: &str, mime: &str, bytes: Vec<u8>) -> BatchEntry {
    Ok(IncomingFile {
        original_name: name.to_string(),
        mime_type: mime.to_string(),
        bytes,
    })
}

fn setup(config: UploadConfig) -> (Arc<MemoryStorage>, UploadIntake) {
    let storage = Arc::new(MemoryStorage::default());
    let intake = UploadIntake::new(
        storage.clone(),
        ThumbnailGenerator::new(&ThumbnailConfig::default()),
        PostProcessor::disabled(),
        &config,
    );
    (storage, intake)
}

#[tokio::test]
async fn test_manifest_preserves_order_and_unique_names() {
    let (storage, intake) = setup(UploadConfig::default());
    let batch = UploadBatch {
        entries: vec![
            incoming("same.png", "image/png", png_bytes(1)),
            incoming("same.png", "image/png", png_bytes(2)),
            incoming("other.png", "image/png", png_bytes(3)),
        ],
        group: None,
    };

    let response = intake.ingest(batch).await.unwrap();
    assert!(response.success);
    assert_eq!(response.message, "3 file(s) uploaded successfully");
    assert_eq!(response.files.len(), 3);

    let originals: Vec<_> = response.files.iter().map(|f| f.original_name.as_str()).collect();
    assert_eq!(originals, vec!["same.png", "same.png", "other.png"]);

    let names: std::collections::HashSet<_> =
        response.files.iter().map(|f| f.filename.clone()).collect();
    assert_eq!(names.len(), 3);

    for file in &response.files {
        assert!(file.filename.starts_with("images-"));
        assert!(file.filename.ends_with(".png"));
        assert_eq!(file.upload_path, format!("/uploads/{}", file.filename));
        assert_eq!(
            file.thumbnail_path.as_deref(),
            Some(format!("/thumbnails/thumb_{}", file.filename).as_str())
        );
        assert!(!file.thumbnail_error);

        let name = StoredFilename::parse(file.filename.clone()).unwrap();
        assert!(storage.original(&name).await.is_some());
        assert!(storage.thumbnail(&name).await.is_some());
    }
}

#[tokio::test]
async fn test_rejected_sibling_is_not_stored() {
    let (storage, intake) = setup(UploadConfig::default());
    let batch = UploadBatch {
        entries: vec![
            incoming("notes.txt", "text/plain", b"hello".to_vec()),
            incoming("photo.png", "image/png", png_bytes(7)),
        ],
        group: None,
    };

    let response = intake.ingest(batch).await.unwrap();
    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].original_name, "photo.png");
    assert_eq!(response.rejected.len(), 1);
    assert_eq!(response.rejected[0].original_name, "notes.txt");
    assert_eq!(storage.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_corrupt_image_keeps_original_without_thumbnail() {
    let (storage, intake) = setup(UploadConfig::default());
    let batch = UploadBatch {
        entries: vec![incoming("broken.jpg", "image/jpeg", b"not a jpeg".to_vec())],
        group: None,
    };

    let response = intake.ingest(batch).await.unwrap();
    let file = &response.files[0];
    assert!(file.thumbnail_path.is_none());
    assert!(file.thumbnail_error);
    assert_eq!(file.size, 10);

    let listed = storage.list().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(!listed[0].has_thumbnail);
}

#[tokio::test]
async fn test_size_ceiling_is_inclusive() {
    let config = UploadConfig {
        max_file_size: 16,
        ..UploadConfig::default()
    };
    let (_storage, intake) = setup(config);
    let batch = UploadBatch {
        entries: vec![
            incoming("exact.png", "image/png", vec![0u8; 16]),
            incoming("over.png", "image/png", vec![0u8; 17]),
        ],
        group: None,
    };

    let response = intake.ingest(batch).await.unwrap();
    assert_eq!(response.files.len(), 1);
    assert_eq!(response.files[0].original_name, "exact.png");
    assert_eq!(response.rejected[0].original_name, "over.png");
}

#[tokio::test]
async fn test_empty_batch_is_rejected() {
    let (_storage, intake) = setup(UploadConfig::default());
    let result = intake.ingest(UploadBatch::default()).await;
    assert!(matches!(result, Err(UploadError::NoFiles)));
}

#[tokio::test]
async fn test_too_many_files_stores_nothing() {
    let config = UploadConfig {
        max_files: 2,
        ..UploadConfig::default()
    };
    let (storage, intake) = setup(config);
    let batch = UploadBatch {
        entries: (0..3)
            .map(|i| incoming("a.png", "image/png", png_bytes(i)))
            .collect(),
        group: None,
    };

    let result = intake.ingest(batch).await;
    assert!(matches!(result, Err(UploadError::TooManyFiles(2))));
    assert!(storage.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_all_rejected_reports_reasons() {
    let (storage, intake) = setup(UploadConfig::default());
    let batch = UploadBatch {
        entries: vec![incoming("doc.pdf", "application/pdf", b"%PDF".to_vec())],
        group: Some(GroupToken::parse("abc").unwrap()),
    };

    match intake.ingest(batch).await {
        Err(UploadError::NothingAccepted(rejected)) => {
            assert_eq!(rejected.len(), 1);
            assert_eq!(rejected[0].reason, "Only image files are allowed");
        }
        other => panic!("unexpected result: {:?}", other.map(|r| r.message)),
    }
    assert!(storage.list().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_storage_failure_surfaces() {
    let (storage, intake) = setup(UploadConfig::default());
    storage.set_unavailable(true);
    let batch = UploadBatch {
        entries: vec![incoming("a.png", "image/png", png_bytes(0))],
        group: None,
    };

    let result = intake.ingest(batch).await;
    assert!(matches!(result, Err(UploadError::Storage(_))));
}

/// Delegates to memory storage but fails every `store` after the first `succeed` calls.
struct FailingAfter {
    inner: Arc<MemoryStorage>,
    succeed: usize,
    stores: AtomicUsize,
}

#[async_trait]
impl StorageBackend for FailingAfter {
    async fn store(&self, name: &StoredFilename, bytes: &[u8]) -> Result<PathBuf, StorageError> {
        if self.stores.fetch_add(1, Ordering::SeqCst) >= self.succeed {
            return Err(StorageError::IoError(std::io::Error::other("disk full")));
        }
        self.inner.store(name, bytes).await
    }

    async fn store_thumbnail(
        &self,
        original: &StoredFilename,
        bytes: &[u8],
    ) -> Result<PathBuf, StorageError> {
        self.inner.store_thumbnail(original, bytes).await
    }

    async fn list(&self) -> Result<Vec<StoredImage>, StorageError> {
        self.inner.list().await
    }

    async fn delete(&self, name: &StoredFilename) -> Result<bool, StorageError> {
        self.inner.delete(name).await
    }

    fn upload_root(&self) -> &Path {
        self.inner.upload_root()
    }

    fn thumbnail_prefix(&self) -> &str {
        self.inner.thumbnail_prefix()
    }

    fn name(&self) -> &str {
        "failing"
    }
}

#[tokio::test]
async fn test_storage_failure_mid_batch_rolls_back_stored_files() {
    let memory = Arc::new(MemoryStorage::default());
    let storage = Arc::new(FailingAfter {
        inner: memory.clone(),
        succeed: 1,
        stores: AtomicUsize::new(0),
    });
    let intake = UploadIntake::new(
        storage,
        ThumbnailGenerator::new(&ThumbnailConfig::default()),
        PostProcessor::disabled(),
        &UploadConfig::default(),
    );
    let batch = UploadBatch {
        entries: vec![
            incoming("a.png", "image/png", png_bytes(1)),
            incoming("b.png", "image/png", png_bytes(2)),
        ],
        group: None,
    };

    let result = intake.ingest(batch).await;
    assert!(matches!(result, Err(UploadError::Storage(_))));
    // Nothing from the failed batch stays visible
    assert!(memory.list().await.unwrap().is_empty());
}

#[test]
fn test_validate_requires_declared_image_type() {
    let (_storage, intake) = setup(UploadConfig::default());
    assert!(intake.validate("a.png", Some("image/png"), None).is_ok());
    assert!(intake.validate("a.png", None, None).is_err());
    assert!(intake.validate("a.png", Some("application/octet-stream"), None).is_err());
}

#[test]
fn test_response_serializes_camel_case() {
    let file = UploadedFile {
        filename: "images-1-2.png".to_string(),
        original_name: "cat.png".to_string(),
        size: 3,
        mime_type: "image/png".to_string(),
        upload_path: "/uploads/images-1-2.png".to_string(),
        thumbnail_path: None,
        thumbnail_error: true,
    };
    let value = serde_json::to_value(&file).unwrap();
    assert_eq!(value["originalName"], "cat.png");
    assert_eq!(value["mimeType"], "image/png");
    assert_eq!(value["thumbnailPath"], serde_json::Value::Null);
    assert_eq!(value["thumbnailError"], true);

    let file = UploadedFile {
        thumbnail_error: false,
        ..file
    };
    let value = serde_json::to_value(&file).unwrap();
    assert!(value.get("thumbnailError").is_none());
}
