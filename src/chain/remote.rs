//! Default chain connector
//!
//! Resolves full-node candidates for a GCI (an explicit `--node-url` pin,
//! or a rendezvous lookup of `chain/<gci>`), probes them, and speaks plain
//! HTTP JSON to the first responsive node. The light-client protocol
//! itself (header sync, proof verification) lives behind the node's HTTP
//! surface and is not re-implemented here.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{Result, WicketError};
use crate::rendezvous::PeerDirectory;

use super::{ChainConnection, Connector};

/// Connector backed by HTTP full nodes discovered via rendezvous
pub struct RemoteConnector {
    directory: Arc<dyn PeerDirectory>,
    node_url: Option<String>,
    client: reqwest::Client,
}

impl RemoteConnector {
    pub fn new(
        directory: Arc<dyn PeerDirectory>,
        node_url: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| WicketError::Config(format!("chain client: {}", e)))?;
        Ok(Self {
            directory,
            node_url,
            client,
        })
    }

    async fn candidates(&self, gci: &str) -> Result<Vec<String>> {
        if let Some(ref url) = self.node_url {
            return Ok(vec![url.clone()]);
        }
        self.directory
            .lookup(&format!("chain/{}", gci))
            .await
            .map_err(|e| WicketError::Connection(format!("node discovery failed: {}", e)))
    }
}

#[async_trait]
impl Connector for RemoteConnector {
    async fn connect(&self, gci: &str) -> Result<Arc<dyn ChainConnection>> {
        let candidates = self.candidates(gci).await?;
        if candidates.is_empty() {
            return Err(WicketError::Connection(format!(
                "no full nodes advertising chain {}",
                gci
            )));
        }

        for url in candidates {
            let base = url.trim_end_matches('/').to_string();
            match self.client.get(format!("{}/health", base)).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(gci = %gci, node = %base, "Connected to full node");
                    return Ok(Arc::new(RemoteConnection::new(
                        base,
                        self.client.clone(),
                    )));
                }
                Ok(response) => {
                    warn!(node = %base, status = %response.status(), "Node probe rejected");
                }
                Err(e) => {
                    warn!(node = %base, error = %e, "Node probe failed");
                }
            }
        }

        Err(WicketError::Connection(format!(
            "no responsive full node for chain {}",
            gci
        )))
    }
}

/// HTTP session against a single full node
pub struct RemoteConnection {
    base: String,
    client: reqwest::Client,
    failed_tx: watch::Sender<bool>,
    failed_rx: watch::Receiver<bool>,
}

impl RemoteConnection {
    fn new(base: String, client: reqwest::Client) -> Self {
        let (failed_tx, failed_rx) = watch::channel(false);
        Self {
            base,
            client,
            failed_tx,
            failed_rx,
        }
    }

    /// Mark the session dead so the pool evicts it
    fn mark_failed(&self) {
        let _ = self.failed_tx.send(true);
    }

    async fn json_of(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_server_error() {
            self.mark_failed();
            return Err(WicketError::Connection(format!("node returned {}", status)));
        }
        if !status.is_success() {
            return Err(WicketError::Connection(format!("node returned {}", status)));
        }
        response
            .json()
            .await
            .map_err(|e| WicketError::Connection(format!("node response: {}", e)))
    }
}

#[async_trait]
impl ChainConnection for RemoteConnection {
    async fn get_state(&self, path: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/state", self.base))
            .query(&[("path", path)])
            .send()
            .await
            .map_err(|e| {
                self.mark_failed();
                WicketError::Connection(format!("state query failed: {}", e))
            })?;
        self.json_of(response).await
    }

    async fn send_tx(&self, tx: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/txs", self.base))
            .json(tx)
            .send()
            .await
            .map_err(|e| {
                self.mark_failed();
                WicketError::Connection(format!("transaction submit failed: {}", e))
            })?;
        self.json_of(response).await
    }

    fn failed(&self) -> watch::Receiver<bool> {
        self.failed_rx.clone()
    }
}
