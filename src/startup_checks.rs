use crate::Config;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum StartupCheckError {
    #[error("Failed to create {0} directory: {1}")]
    DirectoryCreationFailed(&'static str, #[source] std::io::Error),

    #[error("{0} path exists but is not a directory: {1}")]
    NotADirectory(&'static str, String),

    #[error("Static files directory does not exist")]
    StaticDirectoryMissing,

    #[error("Required file missing: {0}")]
    RequiredFileMissing(String),
}

impl StartupCheckError {
    /// Whether the server cannot work at all with this error present.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            StartupCheckError::DirectoryCreationFailed(..) | StartupCheckError::NotADirectory(..)
        )
    }
}

async fn ensure_directory(label: &'static str, dir: &Path) -> Result<(), StartupCheckError> {
    if dir.exists() {
        if !dir.is_dir() {
            error!("{} path is not a directory: {:?}", label, dir);
            return Err(StartupCheckError::NotADirectory(
                label,
                dir.display().to_string(),
            ));
        }
        info!("{} directory exists: {:?}", label, dir);
        return Ok(());
    }

    info!("{} directory does not exist, creating: {:?}", label, dir);
    match tokio::fs::create_dir_all(dir).await {
        Ok(()) => {
            info!("{} directory created successfully", label);
            Ok(())
        }
        Err(e) => {
            error!("Failed to create {} directory: {}", label, e);
            Err(StartupCheckError::DirectoryCreationFailed(label, e))
        }
    }
}

pub async fn perform_startup_checks(config: &Config) -> Result<(), Vec<StartupCheckError>> {
    let mut errors = Vec::new();

    info!("Performing startup checks...");

    for (label, dir) in [
        ("Upload", &config.storage.upload_directory),
        ("Thumbnail", &config.storage.thumbnail_directory),
    ] {
        if let Err(e) = ensure_directory(label, dir).await {
            errors.push(e);
        }
    }

    let static_dir = &config.static_files.directory;
    if !static_dir.exists() {
        warn!("Static files directory does not exist: {:?}", static_dir);
        errors.push(StartupCheckError::StaticDirectoryMissing);
    } else {
        info!("Static files directory exists: {:?}", static_dir);

        let index = static_dir.join("index.html");
        if !index.exists() {
            warn!("Client page missing: {:?}", index);
            errors.push(StartupCheckError::RequiredFileMissing(
                index.display().to_string(),
            ));
        }
    }

    if errors.is_empty() {
        info!("All startup checks passed");
        Ok(())
    } else {
        error!("Startup checks failed with {} errors", errors.len());
        Err(errors)
    }
}
