//! HTTP handlers for static asset serving.

use std::path::{Component, Path, PathBuf};

use axum::{
    body::Body,
    extract::State,
    http::{Response, Uri, header},
};
use percent_encoding::percent_decode_str;
use tracing::{debug, instrument};

use crate::{
    AppState,
    errors::{Error, Result},
};

const ENTRY_DOCUMENT: &str = "index.html";

/// Map a request path onto a relative file path, refusing anything that could leave the asset dir.
fn relative_asset_path(uri_path: &str) -> Option<PathBuf> {
    // Decoding first means an encoded `..%2F` is seen as the traversal it is
    let decoded = percent_decode_str(uri_path).decode_utf8().ok()?;
    let trimmed = decoded.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return Some(PathBuf::from(ENTRY_DOCUMENT));
    }

    let candidate = Path::new(trimmed);
    candidate
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
        .then(|| candidate.to_path_buf())
}

fn cache_control(relative: &Path) -> &'static str {
    // Bundler output under assets/ is content hashed
    if relative.starts_with("assets") {
        "public, max-age=31536000, immutable"
    } else {
        "no-cache"
    }
}

async fn read_file(path: &Path) -> Option<Vec<u8>> {
    let metadata = tokio::fs::metadata(path).await.ok()?;
    if !metadata.is_file() {
        return None;
    }
    tokio::fs::read(path).await.ok()
}

fn asset_response(relative: &Path, content: Vec<u8>) -> Result<Response<Body>> {
    let mime = mime_guess::from_path(relative).first_or_octet_stream();

    Response::builder()
        .header(header::CONTENT_TYPE, mime.as_ref())
        .header(header::CACHE_CONTROL, cache_control(relative))
        .body(Body::from(content))
        .map_err(|e| Error::Other(e.into()))
}

/// Unmatched path and method
pub async fn not_found() -> Error {
    Error::NotFound
}

/// Known path, unsupported method
pub async fn method_not_allowed() -> Error {
    Error::MethodNotAllowed
}

/// Serve files from the configured asset directory with SPA fallback
#[instrument(skip(state))]
pub async fn serve_static_asset(State(state): State<AppState>, uri: Uri) -> Result<Response<Body>> {
    let Some(root) = state.config.static_assets.dir.as_deref() else {
        return Err(Error::NotFound);
    };

    if let Some(relative) = relative_asset_path(uri.path())
        && let Some(content) = read_file(&root.join(&relative)).await
    {
        return asset_response(&relative, content);
    }

    debug!("Hitting SPA fallback for: {}", uri.path());

    let entry = Path::new(ENTRY_DOCUMENT);
    match read_file(&root.join(entry)).await {
        Some(content) => asset_response(entry, content),
        None => Err(Error::NotFound),
    }
}
