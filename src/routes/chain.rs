//! Chain state and transaction routes

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;
use serde_json::Value;
use tracing::debug;

use crate::chain::is_valid_gci;
use crate::error::{Result, WicketError};
use crate::server::AppState;

use super::ok_json;

/// GET `/<gci>/state?path=<path>` - read chain state at a path
pub async fn get_state(state: &AppState, gci: &str, path: &str) -> Result<Response<Full<Bytes>>> {
    check_gci(gci)?;
    let value = state.pool.query(gci, path).await?;
    debug!(gci = %gci, path = %path, "State query served");
    ok_json(&value)
}

/// POST `/<gci>/send` - submit a transaction to the chain
pub async fn send_tx(state: &AppState, gci: &str, body: &[u8]) -> Result<Response<Full<Bytes>>> {
    check_gci(gci)?;
    let tx: Value = serde_json::from_slice(body)
        .map_err(|e| WicketError::BadRequest(format!("transaction body: {}", e)))?;
    let result = state.pool.submit(gci, &tx).await?;
    debug!(gci = %gci, "Transaction forwarded");
    ok_json(&result)
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
