//! Key and signing routes
//!
//! Both routes identify the caller by the gateway-issued cookie identity;
//! the chain comes from the request path. Signing additionally demands
//! that the request originated from the chain's own app page.

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde_json::{json, Value};
use tracing::debug;

use crate::chain::is_valid_gci;
use crate::error::{Result, WicketError};
use crate::server::AppState;

use super::ok_json;

/// GET `/<gci>/keys` - public keys for the caller's keypair on this chain
pub async fn public_key(state: &AppState, gci: &str, user_id: &str) -> Result<Response<Full<Bytes>>> {
    check_gci(gci)?;
    let public = state.keys.public_key(user_id, gci).await?;
    ok_json(&json!({ "public": [public] }))
}

/// POST `/<gci>/sign` - sign a payload with the caller's keypair.
/// The body is the base64 signature as a bare JSON string.
pub async fn sign(
    state: &AppState,
    gci: &str,
    user_id: &str,
    referer: Option<&str>,
    body: &[u8],
) -> Result<Response<Full<Bytes>>> {
    check_gci(gci)?;
    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| WicketError::BadRequest(format!("signing payload: {}", e)))?;

    let signature = state.keys.sign(user_id, gci, referer, &payload).await?;
    debug!(gci = %gci, "Signed payload");
    ok_json(&json!(signature))
}

fn check_gci(gci: &str) -> Result<()> {
    if is_valid_gci(gci) {
        Ok(())
    } else {
        Err(WicketError::BadRequest(format!(
            "invalid chain identifier: {}",
            gci
        )))
    }
}
