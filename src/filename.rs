//! Validated names for stored files and grouping tokens.
//!
//! Anything that ends up joined onto a storage directory goes through one of
//! these types first. Raw request strings never reach `Path::join`.

use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

const MAX_NAME_LEN: usize = 255;
const MAX_EXTENSION_LEN: usize = 10;

/// Extensions the gallery lists as images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilenameError {
    #[error("name is empty")]
    Empty,

    #[error("name is longer than {MAX_NAME_LEN} bytes")]
    TooLong,

    #[error("name contains a path separator")]
    PathSeparator,

    #[error("name contains a parent directory segment")]
    ParentSegment,

    #[error("name contains control characters")]
    ControlCharacter,

    #[error("name starts with a dot")]
    Hidden,
}

fn check_segment(value: &str) -> Result<(), FilenameError> {
    if value.is_empty() {
        return Err(FilenameError::Empty);
    }
    if value.len() > MAX_NAME_LEN {
        return Err(FilenameError::TooLong);
    }
    if value.contains("..") {
        return Err(FilenameError::ParentSegment);
    }
    if value.contains(['/', '\\']) {
        return Err(FilenameError::PathSeparator);
    }
    if value.chars().any(char::is_control) {
        return Err(FilenameError::ControlCharacter);
    }
    if value.starts_with('.') {
        return Err(FilenameError::Hidden);
    }
    Ok(())
}

/// A single path segment that is safe to join onto the upload or thumbnail directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct StoredFilename(String);

impl StoredFilename {
    /// Validate a name received from a client or read back from storage.
    pub fn parse(value: impl Into<String>) -> Result<Self, FilenameError> {
        let value = value.into();
        check_segment(&value)?;
        Ok(Self(value))
    }

    /// Generate a collision-resistant name: `<prefix>-<unix millis>-<random><.ext>`.
    ///
    /// The extension is taken from the client's original filename, lowercased
    /// and stripped to ASCII alphanumerics.
    pub fn generate(prefix: &str, original_name: &str) -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let suffix: u32 = rand::rng().random_range(0..1_000_000_000);
        let prefix: String = prefix
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        let prefix = if prefix.is_empty() { "file" } else { &prefix };

        let name = match sanitized_extension(original_name) {
            Some(ext) => format!("{}-{}-{}.{}", prefix, millis, suffix, ext),
            None => format!("{}-{}-{}", prefix, millis, suffix),
        };
        Self(name)
    }

    /// The name of this file's thumbnail.
    pub fn thumbnail(&self, marker: &str) -> Result<Self, FilenameError> {
        Self::parse(format!("{}{}", marker, self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased extension, if any.
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.0)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
    }

    pub fn has_image_extension(&self) -> bool {
        self.extension()
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
    }
}

impl fmt::Display for StoredFilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<Path> for StoredFilename {
    fn as_ref(&self) -> &Path {
        Path::new(&self.0)
    }
}

fn sanitized_extension(original_name: &str) -> Option<String> {
    let ext = Path::new(original_name).extension()?.to_str()?;
    let ext: String = ext
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    if ext.is_empty() || ext.len() > MAX_EXTENSION_LEN {
        None
    } else {
        Some(ext)
    }
}

/// Opaque token a client sends to group a batch of uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GroupToken(String);

impl GroupToken {
    pub fn parse(value: impl Into<String>) -> Result<Self, FilenameError> {
        let value = value.into();
        check_segment(&value)?;
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
