//! Swarm-backed content fetcher
//!
//! Looks up peers advertising a content hash via the rendezvous directory,
//! then streams the payload from every candidate concurrently and takes
//! the first one whose digest matches. Losing candidates are dropped,
//! which cancels their streams; a peer serving mismatching bytes is
//! discarded without penalty or retry. The whole operation is bounded by a
//! deadline and fails with `FetchTimeout` rather than hanging.
//!
//! Peer wire format: the requester writes the hex hash followed by a
//! newline, the peer answers with a u32 big-endian length prefix and the
//! payload.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::error::{Result, WicketError};
use crate::rendezvous::PeerDirectory;

use super::{verify_digest, ContentFetcher};

/// Content fetcher backed by a peer-discovery swarm
pub struct SwarmFetcher {
    directory: Arc<dyn PeerDirectory>,
    timeout: Duration,
    max_bytes: u64,
}

impl SwarmFetcher {
    pub fn new(directory: Arc<dyn PeerDirectory>, timeout: Duration, max_bytes: u64) -> Self {
        Self {
            directory,
            timeout,
            max_bytes,
        }
    }

    /// Race all candidate peers, accepting the first verified payload
    async fn race_candidates(&self, content_hash: &str) -> Result<Vec<u8>> {
        let peers = self.directory.lookup(content_hash).await?;
        if peers.is_empty() {
            return Err(WicketError::Fetch(format!(
                "no peers advertising {}",
                content_hash
            )));
        }

        let mut candidates: FuturesUnordered<_> = peers
            .into_iter()
            .map(|addr| stream_from_peer(addr, content_hash.to_string(), self.max_bytes))
            .collect();

        while let Some(outcome) = candidates.next().await {
            match outcome {
                Ok((addr, bytes)) => match verify_digest(&bytes, content_hash) {
                    Ok(()) => {
                        debug!(hash = %content_hash, peer = %addr, size = bytes.len(), "Accepted verified payload");
                        // Remaining candidates are dropped, cancelling their streams
                        return Ok(bytes);
                    }
                    Err(_) => {
                        debug!(hash = %content_hash, peer = %addr, "Discarding mismatching candidate");
                    }
                },
                Err((addr, reason)) => {
                    debug!(hash = %content_hash, peer = %addr, reason = %reason, "Candidate failed");
                }
            }
        }

        Err(WicketError::Fetch(format!(
            "no source produced matching content for {}",
            content_hash
        )))
    }
}

#[async_trait]
impl ContentFetcher for SwarmFetcher {
    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.race_candidates(content_hash))
            .await
            .map_err(|_| {
                WicketError::FetchTimeout(format!(
                    "no matching source for {} within {}ms",
                    content_hash,
                    self.timeout.as_millis()
                ))
            })?
    }
}

/// Stream one candidate peer's payload. Errors carry the peer address so
/// the race loop can log them without aborting.
async fn stream_from_peer(
    addr: String,
    content_hash: String,
    max_bytes: u64,
) -> std::result::Result<(String, Vec<u8>), (String, String)> {
    let result = async {
        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| format!("connect: {}", e))?;

        stream
            .write_all(format!("{}\n", content_hash).as_bytes())
            .await
            .map_err(|e| format!("request: {}", e))?;

        let mut len_buf = [0u8; 4];
        stream
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| format!("length prefix: {}", e))?;
        let len = u32::from_be_bytes(len_buf) as u64;
        if len > max_bytes {
            return Err(format!("payload of {} bytes exceeds limit", len));
        }

        let mut payload = vec![0u8; len as usize];
        stream
            .read_exact(&mut payload)
            .await
            .map_err(|e| format!("payload: {}", e))?;

        Ok(payload)
    }
    .await;

    match result {
        Ok(bytes) => Ok((addr, bytes)),
        Err(reason) => Err((addr, reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::digest_hex;
    use tokio::io::AsyncBufReadExt;
    use tokio::net::TcpListener;

    struct StubDirectory {
        peers: Vec<String>,
    }

    #[async_trait]
    impl PeerDirectory for StubDirectory {
        async fn lookup(&self, _topic: &str) -> Result<Vec<String>> {
            Ok(self.peers.clone())
        }
    }

    /// Spawn a peer that serves a fixed payload to every requester
    async fn spawn_peer(payload: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let payload = payload.clone();
                tokio::spawn(async move {
                    let mut reader = tokio::io::BufReader::new(stream);
                    let mut request = String::new();
                    let _ = reader.read_line(&mut request).await;
                    let mut stream = reader.into_inner();
                    let len = (payload.len() as u32).to_be_bytes();
                    let _ = stream.write_all(&len).await;
                    let _ = stream.write_all(&payload).await;
                });
            }
        });
        addr
    }

    /// Spawn a peer that accepts connections but never responds
    async fn spawn_silent_peer() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        addr
    }

    fn fetcher(peers: Vec<String>, timeout: Duration) -> SwarmFetcher {
        SwarmFetcher::new(Arc::new(StubDirectory { peers }), timeout, 1024 * 1024)
    }

    #[tokio::test]
    async fn test_fetch_from_honest_peer() {
        let payload = b"the client bundle".to_vec();
        let hash = digest_hex(&payload);
        let peer = spawn_peer(payload.clone()).await;

        let fetcher = fetcher(vec![peer], Duration::from_secs(2));
        assert_eq!(fetcher.fetch(&hash).await.unwrap(), payload);
    }

    #[tokio::test]
    async fn test_tampered_peer_is_never_returned() {
        let wanted = b"genuine bundle".to_vec();
        let hash = digest_hex(&wanted);
        let tampered = spawn_peer(b"tampered bytes".to_vec()).await;

        let fetcher = fetcher(vec![tampered], Duration::from_secs(2));
        let err = fetcher.fetch(&hash).await.unwrap_err();
        assert!(matches!(err, WicketError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_tampered_peer_loses_to_honest_peer() {
        let wanted = b"genuine bundle".to_vec();
        let hash = digest_hex(&wanted);
        let tampered = spawn_peer(b"tampered bytes".to_vec()).await;
        let honest = spawn_peer(wanted.clone()).await;

        let fetcher = fetcher(vec![tampered, honest], Duration::from_secs(2));
        assert_eq!(fetcher.fetch(&hash).await.unwrap(), wanted);
    }

    #[tokio::test]
    async fn test_no_peers() {
        let fetcher = fetcher(vec![], Duration::from_secs(1));
        let err = fetcher.fetch("ab".repeat(32).as_str()).await.unwrap_err();
        assert!(matches!(err, WicketError::Fetch(_)));
    }

    #[tokio::test]
    async fn test_silent_swarm_times_out() {
        let silent = spawn_silent_peer().await;
        let fetcher = fetcher(vec![silent], Duration::from_millis(150));
        let err = fetcher.fetch("ab".repeat(32).as_str()).await.unwrap_err();
        assert!(matches!(err, WicketError::FetchTimeout(_)));
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected() {
        let payload = vec![0u8; 64];
        let hash = digest_hex(&payload);
        let peer = spawn_peer(payload).await;

        let fetcher = SwarmFetcher::new(
            Arc::new(StubDirectory { peers: vec![peer] }),
            Duration::from_secs(1),
            16, // limit below the payload size
        );
        assert!(fetcher.fetch(&hash).await.is_err());
    }
}
