//! Health and version endpoints

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde::Serialize;

use crate::error::{Result, WicketError};
use crate::server::AppState;

use super::ok_json;

#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub status: &'static str,
    #[serde(rename = "nodeId")]
    pub node_id: String,
    pub version: &'static str,
    /// Seconds since process start
    pub uptime: u64,
    /// Ready chain connections held by the pool
    #[serde(rename = "liveConnections")]
    pub live_connections: usize,
}

#[derive(Serialize)]
pub struct VersionResponse {
    pub version: &'static str,
    pub commit: &'static str,
    pub built: &'static str,
}

/// GET `/health` - liveness probe with runtime counters
pub async fn health(state: &AppState) -> Result<Response<Full<Bytes>>> {
    let body = HealthResponse {
        healthy: true,
        status: "online",
        node_id: state.args.node_id.to_string(),
        version: env!("CARGO_PKG_VERSION"),
        uptime: state.started.elapsed().as_secs(),
        live_connections: state.pool.live_count().await,
    };
    ok_json(&serde_json::to_value(&body).map_err(|e| WicketError::Internal(e.to_string()))?)
}

/// GET `/version` - build identity
pub fn version() -> Result<Response<Full<Bytes>>> {
    let body = VersionResponse {
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        built: env!("BUILD_TIMESTAMP"),
    };
    ok_json(&serde_json::to_value(&body).map_err(|e| WicketError::Internal(e.to_string()))?)
}
