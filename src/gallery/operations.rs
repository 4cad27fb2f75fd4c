use super::{Gallery, GalleryEntry, GalleryError};
use crate::filename::StoredFilename;
use crate::storage;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

impl Gallery {
    /// Every stored image with its thumbnail, if one exists, in storage enumeration order.
    pub async fn list_images(&self) -> Result<Vec<GalleryEntry>, GalleryError> {
        let stored = self
            .storage
            .list()
            .await
            .map_err(GalleryError::ListingError)?;
        let prefix = self.storage.thumbnail_prefix();

        let entries: Vec<GalleryEntry> = stored
            .into_iter()
            .filter(|image| {
                let keep = self.is_image(&image.name);
                if !keep {
                    debug!("Skipping non-image file {}", image.name);
                }
                keep
            })
            .map(|image| GalleryEntry {
                filename: image.name.to_string(),
                upload_path: storage::upload_url(&image.name),
                thumbnail_path: image
                    .has_thumbnail
                    .then(|| storage::thumbnail_url(prefix, &image.name)),
                size: image.size,
                upload_date: DateTime::<Utc>::from(image.modified),
            })
            .collect();

        debug!("Listed {} images", entries.len());
        Ok(entries)
    }

    /// Remove an image and its thumbnail. Missing files are not an error.
    pub async fn delete_image(&self, name: &StoredFilename) -> Result<bool, GalleryError> {
        let existed = self
            .storage
            .delete(name)
            .await
            .map_err(GalleryError::DeletionError)?;

        if existed {
            info!("Deleted image {}", name);
        } else {
            info!("Delete requested for unknown image {}", name);
        }
        Ok(existed)
    }
}
