// Gallery module - listing and deleting stored images
mod error;
mod handlers;
mod operations;
mod types;

pub use error::GalleryError;
pub use handlers::{delete_image_handler, list_images_handler};
pub use types::*;

use crate::filename::StoredFilename;
use crate::storage::DynStorage;
use std::sync::Arc;

pub type SharedGallery = Arc<Gallery>;

pub struct Gallery {
    pub(crate) storage: DynStorage,
}

impl Gallery {
    pub fn new(storage: DynStorage) -> Self {
        Self { storage }
    }

    pub(crate) fn is_image(&self, file_name: &StoredFilename) -> bool {
        file_name.has_image_extension()
    }
}
