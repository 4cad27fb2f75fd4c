use crate::ThumbnailConfig;
use crate::filename::StoredFilename;
use crate::storage::{StorageBackend, StorageError};
use image::{DynamicImage, ImageEncoder, codecs::jpeg::JpegEncoder, imageops::FilterType};
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("Image error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Storage error: {0}")]
    StorageError(#[from] StorageError),

    #[error("Thumbnail task failed: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}

/// Produces fixed-size, center-cropped JPEG thumbnails.
#[derive(Debug, Clone)]
pub struct ThumbnailGenerator {
    width: u32,
    height: u32,
    quality: u8,
}

impl ThumbnailGenerator {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            width: config.width.max(1),
            height: config.height.max(1),
            quality: config.jpeg_quality.clamp(1, 100),
        }
    }

    /// Decode `source`, cover-fit it into the target box and encode as JPEG.
    pub fn render(&self, source: &[u8]) -> Result<Vec<u8>, ThumbnailError> {
        let img = image::load_from_memory(source)?;
        debug!(
            "Rendering {}x{} thumbnail from {}x{} source",
            self.width,
            self.height,
            img.width(),
            img.height()
        );

        // resize_to_fill scales to cover the box and crops the overflow around the center
        let cropped = img.resize_to_fill(self.width, self.height, FilterType::Lanczos3);
        encode_jpeg(&cropped, self.quality)
    }

    /// Render a thumbnail for a stored original and persist it next to the other thumbnails.
    pub async fn generate(
        &self,
        storage: &dyn StorageBackend,
        original: &StoredFilename,
        source: Vec<u8>,
    ) -> Result<PathBuf, ThumbnailError> {
        let generator = self.clone();
        let jpeg = tokio::task::spawn_blocking(move || generator.render(&source)).await??;
        Ok(storage.store_thumbnail(original, &jpeg).await?)
    }
}

fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, ThumbnailError> {
    // JPEG doesn't support alpha channel, so convert to RGB
    let rgb_image = image.to_rgb8();
    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut output, quality);
    encoder.write_image(
        &rgb_image,
        rgb_image.width(),
        rgb_image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use image::{ImageBuffer, ImageFormat, Rgb, Rgba};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn generator() -> ThumbnailGenerator {
        ThumbnailGenerator::new(&ThumbnailConfig::default())
    }

    #[test]
    fn test_render_produces_square_jpeg() {
        let jpeg = generator().render(&png_bytes(400, 100)).unwrap();

        assert_eq!(
            image::guess_format(&jpeg).unwrap(),
            ImageFormat::Jpeg,
            "Thumbnails are always JPEG"
        );
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 200));
    }

    #[test]
    fn test_render_upscales_small_sources_to_cover() {
        let jpeg = generator().render(&png_bytes(50, 20)).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (200, 200));
    }

    #[test]
    fn test_render_flattens_alpha() {
        let img = ImageBuffer::from_pixel(300, 300, Rgba([255u8, 0, 0, 64]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let jpeg = generator().render(&bytes).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_render_rejects_corrupt_input() {
        let result = generator().render(b"definitely not an image");
        assert!(matches!(result, Err(ThumbnailError::ImageError(_))));
    }

    #[test]
    fn test_custom_dimensions() {
        let config = ThumbnailConfig {
            width: 64,
            height: 32,
            ..ThumbnailConfig::default()
        };
        let generator = ThumbnailGenerator::new(&config);
        let decoded = image::load_from_memory(&generator.render(&png_bytes(100, 100)).unwrap())
            .unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 32));
    }

    #[tokio::test]
    async fn test_generate_stores_thumbnail() {
        let storage = MemoryStorage::default();
        let name = StoredFilename::parse("images-1-1.png").unwrap();

        generator()
            .generate(&storage, &name, png_bytes(120, 80))
            .await
            .unwrap();

        let stored = storage.thumbnail(&name).await.unwrap();
        assert_eq!(image::guess_format(&stored).unwrap(), ImageFormat::Jpeg);
    }
}
