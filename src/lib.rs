use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod filename;
pub mod gallery;
pub mod post_process;
pub mod startup_checks;
pub mod static_files;
pub mod storage;
pub mod thumbnail;
pub mod upload;

/// URL prefix under which stored originals are served.
pub const UPLOADS_ROUTE: &str = "/uploads";
/// URL prefix under which thumbnails are served.
pub const THUMBNAILS_ROUTE: &str = "/thumbnails";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub static_files: StaticConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
    pub thumbnail: ThumbnailConfig,
    pub post_process: PostProcessConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub name: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticConfig {
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_directory: PathBuf,
    pub thumbnail_directory: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum number of files accepted in a single request
    pub max_files: usize,
    /// Per-file size ceiling in bytes (inclusive)
    pub max_file_size: u64,
    /// Multipart field carrying the image files
    pub file_field: String,
    /// Multipart field carrying the grouping token
    pub group_field: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    pub jpeg_quality: u8,
    /// Marker prepended to the stored filename to name its thumbnail
    pub prefix: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// Program and leading arguments; the target directory is appended.
    /// Post-processing is disabled when unset or empty.
    pub command: Option<Vec<String>>,
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "Imagedrop".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for StaticConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("static"),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_directory: PathBuf::from("uploads"),
            thumbnail_directory: PathBuf::from("thumbnails"),
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_files: 10,
            max_file_size: 10 * 1024 * 1024,
            file_field: "images".to_string(),
            group_field: "hash".to_string(),
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: 200,
            height: 200,
            jpeg_quality: 80,
            prefix: "thumb_".to_string(),
        }
    }
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            command: None,
            timeout_secs: 600,
        }
    }
}

use axum::{
    Router,
    extract::{DefaultBodyLimit, Path, State},
    http::HeaderMap,
    response::IntoResponse,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub assets: static_files::StaticFileHandler,
    pub uploads: static_files::StaticFileHandler,
    pub thumbnails: static_files::StaticFileHandler,
    pub intake: upload::SharedIntake,
    pub gallery: gallery::SharedGallery,
    pub config: Config,
}

async fn index_handler(State(app_state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    app_state.assets.serve("index.html", &headers).await
}

async fn static_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    app_state.assets.serve(&path, &headers).await
}

async fn uploaded_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    app_state.uploads.serve(&path, &headers).await
}

async fn thumbnail_file_handler(
    State(app_state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> impl IntoResponse {
    app_state.thumbnails.serve(&path, &headers).await
}

/// Build the application backed by the configured upload and thumbnail directories.
pub async fn create_app(config: Config) -> Router {
    let storage: storage::DynStorage = Arc::new(storage::DiskStorage::new(
        config.storage.upload_directory.clone(),
        config.storage.thumbnail_directory.clone(),
        config.thumbnail.prefix.clone(),
    ));

    create_app_with_storage(config, storage)
}

/// Build the application on top of an arbitrary storage backend.
pub fn create_app_with_storage(config: Config, storage: storage::DynStorage) -> Router {
    let assets = static_files::StaticFileHandler::new(config.static_files.directory.clone());
    let uploads = static_files::StaticFileHandler::new(config.storage.upload_directory.clone());
    // Thumbnails keep the original's extension but always hold JPEG data
    let thumbnails =
        static_files::StaticFileHandler::new(config.storage.thumbnail_directory.clone())
            .with_content_type("image/jpeg");

    let intake = Arc::new(upload::UploadIntake::new(
        storage.clone(),
        thumbnail::ThumbnailGenerator::new(&config.thumbnail),
        post_process::PostProcessor::new(&config.post_process),
        &config.upload,
    ));
    let gallery = Arc::new(gallery::Gallery::new(storage));

    // Multipart framing overhead on top of the raw file bytes
    let body_limit = (config.upload.max_file_size as usize)
        .saturating_mul(config.upload.max_files.max(1))
        .saturating_add(1024 * 1024);

    let app_state = AppState {
        assets,
        uploads,
        thumbnails,
        intake,
        gallery,
        config,
    };

    Router::new()
        .route("/", axum::routing::get(index_handler))
        .route(
            "/upload",
            axum::routing::post(upload::upload_handler).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/images",
            axum::routing::get(gallery::list_images_handler),
        )
        .route(
            "/api/images/{filename}",
            axum::routing::delete(gallery::delete_image_handler),
        )
        .route("/static/{*path}", axum::routing::get(static_file_handler))
        .route(
            &format!("{}/{{*path}}", UPLOADS_ROUTE),
            axum::routing::get(uploaded_file_handler),
        )
        .route(
            &format!("{}/{{*path}}", THUMBNAILS_ROUTE),
            axum::routing::get(thumbnail_file_handler),
        )
        .layer(
            TraceLayer::new_for_http()
                .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                    tracing::info!(
                        target: "access_log",
                        method = %request.method(),
                        path = %request.uri().path(),
                        "request"
                    );
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     _span: &tracing::Span| {
                        tracing::info!(
                            target: "access_log",
                            status = %response.status(),
                            latency_ms = %latency.as_millis(),
                            "response"
                        );
                    },
                ),
        )
        .with_state(app_state)
}
