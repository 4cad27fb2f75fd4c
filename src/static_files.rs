use axum::{
    body::Body,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, warn};

/// Serves files from a single directory with cache validators.
#[derive(Clone)]
pub struct StaticFileHandler {
    pub root: PathBuf,
    content_type: Option<&'static str>,
}

impl StaticFileHandler {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            content_type: None,
        }
    }

    /// Serve every file with a fixed content type instead of guessing from the extension.
    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Resolve a request path below the root, refusing anything but plain segments.
    fn resolve(&self, path: &str) -> Option<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let mut resolved = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(segment) => resolved.push(segment),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(resolved)
    }

    pub async fn serve(&self, path: &str, request_headers: &HeaderMap) -> Response {
        let Some(file_path) = self.resolve(path) else {
            warn!("Path traversal attempt: {:?}", path);
            return (StatusCode::FORBIDDEN, "Forbidden").into_response();
        };

        debug!("Attempting to serve static file: {:?}", file_path);

        let metadata = match tokio::fs::metadata(&file_path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => return (StatusCode::NOT_FOUND, "File not found").into_response(),
            Err(e) => {
                debug!("Failed to get metadata for {:?}: {}", file_path, e);
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
        };

        let content_type = match self.content_type {
            Some(content_type) => content_type.to_string(),
            None => mime_guess::from_path(&file_path)
                .first_or_octet_stream()
                .to_string(),
        };

        let cache_control = if content_type.starts_with("image/") {
            // Stored names are never reused, so images can be cached for long
            "public, max-age=31536000"
        } else if content_type.starts_with("text/css")
            || content_type.starts_with("text/javascript")
            || content_type.starts_with("application/javascript")
        {
            "public, max-age=300, must-revalidate"
        } else {
            "no-cache"
        };

        let mut response = Response::builder()
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CACHE_CONTROL, cache_control);

        if let Ok(modified) = metadata.modified()
            && let Ok(duration) = modified.duration_since(UNIX_EPOCH)
        {
            // ETag based on modification time and file size
            let etag = format!("\"{}-{}\"", duration.as_secs(), metadata.len());

            let not_modified = request_headers
                .get(header::IF_NONE_MATCH)
                .and_then(|h| h.to_str().ok())
                .is_some_and(|value| value.split(',').any(|tag| tag.trim() == etag));

            response = response
                .header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified))
                .header(header::ETAG, etag);

            if not_modified {
                return finish(response.status(StatusCode::NOT_MODIFIED), Body::empty());
            }
        }

        let file = match File::open(&file_path).await {
            Ok(file) => file,
            Err(e) => {
                debug!("Failed to open file {:?}: {}", file_path, e);
                return (StatusCode::NOT_FOUND, "File not found").into_response();
            }
        };

        let body = Body::from_stream(ReaderStream::new(file));
        finish(
            response
                .status(StatusCode::OK)
                .header(header::CONTENT_LENGTH, metadata.len()),
            body,
        )
    }
}

fn finish(builder: axum::http::response::Builder, body: Body) -> Response {
    builder.body(body).unwrap_or_else(|e| {
        error!("Failed to build static file response: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    })
}
