//! Light-client chain connections
//!
//! A chain is named by its GCI (genesis content identifier), an opaque
//! token treated here purely as a routing key. The [`Connector`] trait is
//! the boundary to the external light-client implementation; the
//! [`ConnectionPool`] owns zero-or-one live connection per GCI, creating
//! them lazily and evicting them when they signal failure.

pub mod pool;
pub mod remote;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::Result;

pub use pool::ConnectionPool;
pub use remote::RemoteConnector;

/// A live light-client session bound to exactly one chain.
#[async_trait]
pub trait ChainConnection: Send + Sync {
    /// Read the chain state value at a path
    async fn get_state(&self, path: &str) -> Result<Value>;

    /// Submit a transaction to the chain
    async fn send_tx(&self, tx: &Value) -> Result<Value>;

    /// Error signal: flips to `true` when the session is unrecoverably
    /// dead. The pool watches this to evict the entry.
    fn failed(&self) -> watch::Receiver<bool>;
}

/// Establishes light-client connections. Implemented by the external
/// collaborator; the pool only ever calls `connect`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, gci: &str) -> Result<Arc<dyn ChainConnection>>;
}

/// Whether a token is acceptable as a chain identifier.
///
/// GCIs become path components of the bundle cache, so anything outside
/// this alphabet is refused before it reaches the filesystem.
pub fn is_valid_gci(gci: &str) -> bool {
    !gci.is_empty()
        && gci.len() <= 128
        && gci
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gci_validation() {
        assert!(is_valid_gci("chainA"));
        assert!(is_valid_gci("2f9a-bc_3"));
        assert!(!is_valid_gci(""));
        assert!(!is_valid_gci("../escape"));
        assert!(!is_valid_gci("a/b"));
        assert!(!is_valid_gci("a.b"));
        assert!(!is_valid_gci(&"x".repeat(129)));
    }
}
