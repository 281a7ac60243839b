//! Request handlers
//!
//! Handlers take already-parsed request parts (chain identifier, body
//! bytes, cookie identity, referer) and return a full response or a
//! [`WicketError`]; the server layer owns parsing, dispatch, and turning
//! errors into HTTP responses.

pub mod bundle;
pub mod chain;
pub mod health;
pub mod keys;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};

use crate::error::{Result, WicketError};

/// JSON response with an explicit status
pub fn json_response(status: StatusCode, value: &serde_json::Value) -> Result<Response<Full<Bytes>>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(value.to_string())))
        .map_err(|e| WicketError::Internal(format!("response build: {}", e)))
}

/// 200 JSON response
pub fn ok_json(value: &serde_json::Value) -> Result<Response<Full<Bytes>>> {
    json_response(StatusCode::OK, value)
}

/// Turn a handler error into its JSON error response
pub fn error_response(err: &WicketError) -> Response<Full<Bytes>> {
    let status = err.status_code();
    let body = serde_json::json!({ "error": err.to_string() });
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"{}"))))
}
