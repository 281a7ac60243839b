//! Client bundle cache
//!
//! Materializes a chain's browser client on local disk. A bundle is a zip
//! archive addressed by its content hash; [`BundleStore::ensure`] fetches
//! it (digest-verified by the fetcher), strips the archive's single
//! leading directory, and extracts into `<root>/<gci>/`. Extraction goes
//! through a temp directory and an atomic rename, so a bundle directory
//! either exists complete or not at all. Concurrent ensures for the same
//! chain coalesce into a single fetch.
//!
//! The fetch-and-extract runs in a spawned task: a caller disconnecting
//! mid-flight does not abort the work for the other waiters.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::error::{Result, WicketError};
use crate::fetch::ContentFetcher;

/// Outcome relayed to coalesced waiters. broadcast requires `Clone`, so a
/// failure crosses the channel with its class preserved.
type EnsureOutcome = std::result::Result<(), EnsureFailure>;

#[derive(Debug, Clone)]
enum EnsureFailure {
    Verification { expected: String, actual: String },
    Timeout(String),
    Failed(String),
}

impl EnsureFailure {
    fn of(err: &WicketError) -> Self {
        match err {
            WicketError::Verification { expected, actual } => Self::Verification {
                expected: expected.clone(),
                actual: actual.clone(),
            },
            WicketError::FetchTimeout(msg) => Self::Timeout(msg.clone()),
            other => Self::Failed(other.to_string()),
        }
    }

    fn into_error(self) -> WicketError {
        match self {
            Self::Verification { expected, actual } => {
                WicketError::Verification { expected, actual }
            }
            Self::Timeout(msg) => WicketError::FetchTimeout(msg),
            Self::Failed(msg) => WicketError::Fetch(msg),
        }
    }
}

/// Disk cache of extracted client bundles, keyed by chain identifier
pub struct BundleStore {
    root: PathBuf,
    fetcher: Arc<dyn ContentFetcher>,
    in_flight: Mutex<HashMap<String, broadcast::Sender<EnsureOutcome>>>,
}

impl BundleStore {
    pub fn new(root: PathBuf, fetcher: Arc<dyn ContentFetcher>) -> Self {
        Self {
            root,
            fetcher,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Directory a chain's client is served from
    pub fn client_dir(&self, gci: &str) -> PathBuf {
        self.root.join(gci)
    }

    /// Whether a chain's client is already on disk
    pub fn is_ensured(&self, gci: &str) -> bool {
        self.client_dir(gci).is_dir()
    }

    /// Make sure the client for `gci` is extracted on disk, fetching the
    /// archive addressed by `content_hash` if it is not. Returns the
    /// directory the client is served from.
    pub async fn ensure(self: &Arc<Self>, gci: &str, content_hash: &str) -> Result<PathBuf> {
        let target = self.client_dir(gci);
        if target.is_dir() {
            return Ok(target);
        }

        let mut rx = {
            let mut in_flight = self.in_flight.lock().await;
            // Re-check under the lock: a racing ensure may have finished
            if target.is_dir() {
                return Ok(target);
            }
            match in_flight.get(gci) {
                Some(tx) => tx.subscribe(),
                None => {
                    let (tx, rx) = broadcast::channel(1);
                    in_flight.insert(gci.to_string(), tx.clone());

                    let store = Arc::clone(self);
                    let gci = gci.to_string();
                    let content_hash = content_hash.to_string();
                    let target = target.clone();
                    tokio::spawn(async move {
                        store.drive_populate(gci, content_hash, target, tx).await;
                    });

                    rx
                }
            }
        };

        debug!(gci = %gci, "Waiting on in-flight bundle fetch");
        match rx.recv().await {
            Ok(Ok(())) => Ok(target),
            Ok(Err(failure)) => Err(failure.into_error()),
            Err(_) => Err(WicketError::Internal(
                "bundle fetch dropped before completing".to_string(),
            )),
        }
    }

    /// Drop an extracted client so the next ensure re-fetches it
    pub async fn invalidate(&self, gci: &str) -> Result<()> {
        let target = self.client_dir(gci);
        if target.is_dir() {
            tokio::fs::remove_dir_all(&target).await?;
            info!(gci = %gci, "Invalidated client bundle");
        }
        Ok(())
    }

    /// Run the shared fetch-and-extract for a GCI and broadcast the outcome
    async fn drive_populate(
        self: Arc<Self>,
        gci: String,
        content_hash: String,
        target: PathBuf,
        tx: broadcast::Sender<EnsureOutcome>,
    ) {
        let outcome = self.fetch_and_extract(&gci, &content_hash, &target).await;
        self.in_flight.lock().await.remove(&gci);

        let relayed = match &outcome {
            Ok(_) => Ok(()),
            Err(err) => Err(EnsureFailure::of(err)),
        };
        // Receivers may all have dropped; that is fine
        let _ = tx.send(relayed);
    }

    async fn fetch_and_extract(
        &self,
        gci: &str,
        content_hash: &str,
        target: &Path,
    ) -> Result<PathBuf> {
        let bytes = self.fetcher.fetch(content_hash).await?;
        debug!(gci = %gci, hash = %content_hash, size = bytes.len(), "Fetched client archive");

        tokio::fs::create_dir_all(&self.root).await?;
        let staging = self.root.join(format!(".staging-{}", gci));
        if staging.exists() {
            tokio::fs::remove_dir_all(&staging).await?;
        }

        let staging_for_extract = staging.clone();
        tokio::task::spawn_blocking(move || extract_stripped(&bytes, &staging_for_extract))
            .await
            .map_err(|e| WicketError::Internal(format!("extract task: {}", e)))??;

        match tokio::fs::rename(&staging, target).await {
            Ok(()) => {}
            // A racing populate (different gateway process sharing the
            // home dir) may have won the rename
            Err(_) if target.is_dir() => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
            }
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(e.into());
            }
        }

        info!(gci = %gci, hash = %content_hash, "Client bundle ready");
        Ok(target.to_path_buf())
    }
}

/// Extract a zip archive into `dest`, stripping each entry's leading path
/// component (archives are packed as `<top>/index.html`, `<top>/app.js`).
/// Entries that would escape `dest` are rejected.
fn extract_stripped(bytes: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| WicketError::Fetch(format!("bad client archive: {}", e)))?;

    std::fs::create_dir_all(dest)?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| WicketError::Fetch(format!("bad archive entry: {}", e)))?;

        let Some(enclosed) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };
        let Some(stripped) = strip_leading_component(&enclosed) else {
            // The top-level directory entry itself
            continue;
        };

        let out_path = dest.join(&stripped);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut contents = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut contents)?;
        std::fs::write(&out_path, contents)?;
    }

    Ok(())
}

/// Drop the first normal path component; `None` when nothing remains
fn strip_leading_component(path: &Path) -> Option<PathBuf> {
    let mut components = path.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        _ => return None,
    }
    let rest: PathBuf = components.as_path().to_path_buf();
    if rest.as_os_str().is_empty() {
        None
    } else {
        Some(rest)
    }
}
