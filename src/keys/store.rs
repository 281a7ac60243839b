//! Durable seed storage
//!
//! Maps an opaque index (`"<userId>:<gci>"`) to a base64-encoded 32-byte
//! seed in a sled tree under the gateway home directory. Writes are flushed
//! before being acknowledged, so a seed is never observable as stored
//! unless the write fully succeeded.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use sled::Db;
use tracing::info;

use crate::error::{Result, WicketError};

/// Ed25519 seed length in bytes
pub const SEED_LEN: usize = 32;

/// Durable mapping from key index to secret seed
pub struct KeyStore {
    db: Db,
}

impl KeyStore {
    /// Open or create the key store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())?;
        info!(path = %path.as_ref().display(), "Opened key store");
        Ok(Self { db })
    }

    /// Open an in-memory store (tests)
    #[cfg(test)]
    pub fn ephemeral() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Look up the seed stored for an index
    pub fn get_seed(&self, index: &str) -> Result<Option<[u8; SEED_LEN]>> {
        match self.db.get(index.as_bytes())? {
            Some(value) => Ok(Some(decode_seed(&value)?)),
            None => Ok(None),
        }
    }

    /// Store a seed for an index unless one already exists.
    ///
    /// Returns the seed that ended up persisted: the caller's on a clean
    /// insert, the previously stored one if another writer got there first.
    /// At most one seed ever exists per index.
    pub fn create_seed_if_absent(&self, index: &str, seed: &[u8; SEED_LEN]) -> Result<[u8; SEED_LEN]> {
        let encoded = BASE64.encode(seed);
        match self
            .db
            .compare_and_swap(index.as_bytes(), None::<&[u8]>, Some(encoded.as_bytes()))?
        {
            Ok(()) => {
                self.db
                    .flush()
                    .map_err(|e| WicketError::Store(format!("flush failed: {}", e)))?;
                Ok(*seed)
            }
            Err(cas) => {
                // Lost the race; the stored seed wins
                let current = cas
                    .current
                    .ok_or_else(|| WicketError::Store("seed vanished during create".into()))?;
                decode_seed(&current)
            }
        }
    }

    /// Whether any seed exists for an index
    pub fn contains(&self, index: &str) -> Result<bool> {
        Ok(self.db.contains_key(index.as_bytes())?)
    }

    /// Number of stored seeds
    pub fn len(&self) -> usize {
        self.db.len()
    }

    /// Whether the store is empty
    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

fn decode_seed(value: &[u8]) -> Result<[u8; SEED_LEN]> {
    let bytes = BASE64
        .decode(value)
        .map_err(|e| WicketError::Store(format!("invalid seed encoding: {}", e)))?;
    bytes
        .try_into()
        .map_err(|_| WicketError::Store("invalid seed length".into()))
}
