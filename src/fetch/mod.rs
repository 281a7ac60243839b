//! Content-addressed retrieval
//!
//! Resolves a content hash (lowercase hex SHA-256) to verified bytes.
//! Two interchangeable backends satisfy the [`ContentFetcher`] contract:
//! a peer-discovery swarm ([`swarm::SwarmFetcher`]) and a centralized
//! content-addressed store ([`store::StoreFetcher`]). Bytes are never
//! returned before their digest has been checked against the requested
//! hash.

pub mod store;
pub mod swarm;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{Result, WicketError};

pub use store::StoreFetcher;
pub use swarm::SwarmFetcher;

/// Resolves a content hash to verified raw bytes
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>>;
}

/// Hex SHA-256 digest of a byte blob
pub fn digest_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Check bytes against an expected hex digest (case-insensitive)
pub fn verify_digest(bytes: &[u8], expected: &str) -> Result<()> {
    let actual = digest_hex(bytes);
    if actual.eq_ignore_ascii_case(expected) {
        Ok(())
    } else {
        Err(WicketError::Verification {
            expected: expected.to_lowercase(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_hex() {
        // Well-known SHA-256 of the empty string
        assert_eq!(
            digest_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_verify_matches() {
        let bytes = b"bundle bytes";
        assert!(verify_digest(bytes, &digest_hex(bytes)).is_ok());
        // Case-insensitive comparison
        assert!(verify_digest(bytes, &digest_hex(bytes).to_uppercase()).is_ok());
    }

    #[test]
    fn test_verify_rejects_mismatch() {
        let err = verify_digest(b"tampered", &digest_hex(b"original")).unwrap_err();
        assert!(matches!(err, WicketError::Verification { .. }));
    }
}
