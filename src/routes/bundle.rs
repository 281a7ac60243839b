//! Client bundle serving
//!
//! Serves the extracted browser client for a chain. On a cache miss the
//! chain itself is asked where its client lives: the well-known state key
//! `_clientHash` holds the content hash of the current bundle. The hash is
//! queried at most once per chain while the extracted directory exists.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use tracing::debug;

use crate::chain::is_valid_gci;
use crate::error::{Result, WicketError};
use crate::server::AppState;

/// State key a chain publishes its client bundle hash under
pub const CLIENT_HASH_KEY: &str = "_clientHash";

/// GET `/<gci>/<asset..>` - serve a file from the chain's client bundle
pub async fn serve(state: &AppState, gci: &str, asset: &str) -> Result<Response<Full<Bytes>>> {
    if !is_valid_gci(gci) {
        return Err(WicketError::BadRequest(format!(
            "invalid chain identifier: {}",
            gci
        )));
    }

    if !state.bundles.is_ensured(gci) {
        let published = state.pool.query(gci, CLIENT_HASH_KEY).await?;
        let hash = published.as_str().filter(|s| !s.is_empty()).ok_or_else(|| {
            WicketError::NotFound(format!("chain {} publishes no client bundle", gci))
        })?;
        state.bundles.ensure(gci, hash).await?;
    }

    let relative = sanitize_asset(asset)?;
    let file_path = state.bundles.client_dir(gci).join(&relative);

    let bytes = match tokio::fs::read(&file_path).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return Err(WicketError::NotFound(format!(
                "{} has no file {}",
                gci,
                relative.display()
            )))
        }
    };

    debug!(gci = %gci, asset = %relative.display(), size = bytes.len(), "Served client asset");
    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", guess_content_type(&relative))
        .body(Full::new(Bytes::from(bytes)))
        .map_err(|e| WicketError::Internal(format!("response build: {}", e)))
}

/// Normalize an asset path and refuse anything that could escape the
/// bundle directory. Empty paths and directory paths get `index.html`.
fn sanitize_asset(asset: &str) -> Result<PathBuf> {
    let trimmed = asset.trim_start_matches('/');
    if trimmed.is_empty() || trimmed.ends_with('/') {
        return Ok(PathBuf::from(trimmed).join("index.html"));
    }

    let path = Path::new(trimmed);
    for component in path.components() {
        match component {
            Component::Normal(_) => {}
            _ => {
                return Err(WicketError::BadRequest(format!(
                    "invalid asset path: {}",
                    asset
                )))
            }
        }
    }
    Ok(path.to_path_buf())
}

/// Content type from a file extension
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js") | Some("mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("wasm") => "application/wasm",
        Some("txt") => "text/plain; charset=utf-8",
        Some("map") => "application/json",
        _ => "application/octet-stream",
    }
}
