//! Error types for wicket

use hyper::StatusCode;

/// Main error type for gateway operations
#[derive(Debug, thiserror::Error)]
pub enum WicketError {
    /// Chain identifier could not be determined from the request
    #[error("Routing error: {0}")]
    Routing(String),

    /// Light-client connect/query/send failed
    #[error("Connection error: {0}")]
    Connection(String),

    /// Fetched bytes did not hash to the requested content hash
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    Verification { expected: String, actual: String },

    /// No peer or store produced the content within the bound
    #[error("Fetch timed out: {0}")]
    FetchTimeout(String),

    /// Content retrieval failed for a reason other than a timeout
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Policy rejection: signing requested from a mismatched origin
    #[error("Authorization error: {0}")]
    Authorization(String),

    /// Underlying key/content persistence failed
    #[error("Store error: {0}")]
    Store(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WicketError {
    /// Convert error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Routing(_) => StatusCode::BAD_REQUEST,
            Self::Connection(_) => StatusCode::BAD_GATEWAY,
            Self::Verification { .. } => StatusCode::BAD_GATEWAY,
            Self::FetchTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Fetch(_) => StatusCode::BAD_GATEWAY,
            Self::Authorization(_) => StatusCode::UNAUTHORIZED,
            Self::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for WicketError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for WicketError {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest(format!("JSON error: {}", err))
    }
}

impl From<sled::Error> for WicketError {
    fn from(err: sled::Error) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, WicketError>;
