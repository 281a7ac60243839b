//! Rendezvous peer directory
//!
//! Thin client for a discovery service that maps a topic (a content hash,
//! or `chain/<gci>` for full nodes) to the addresses currently advertising
//! it. The gateway only ever looks topics up; announcing is the job of
//! full nodes and bundle seeders.

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, WicketError};

/// Directory of peers advertising a topic
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// Addresses currently advertising `topic`. An empty list is a valid
    /// answer, not an error.
    async fn lookup(&self, topic: &str) -> Result<Vec<String>>;
}

/// HTTP-backed rendezvous directory
pub struct HttpRendezvous {
    base_url: String,
    client: reqwest::Client,
}

impl HttpRendezvous {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WicketError::Config(format!("rendezvous client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl PeerDirectory for HttpRendezvous {
    async fn lookup(&self, topic: &str) -> Result<Vec<String>> {
        let url = format!("{}/rendezvous/{}", self.base_url, topic);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| WicketError::Fetch(format!("rendezvous lookup failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(WicketError::Fetch(format!(
                "rendezvous lookup returned {}",
                response.status()
            )));
        }

        let peers: Vec<String> = response
            .json()
            .await
            .map_err(|e| WicketError::Fetch(format!("rendezvous response: {}", e)))?;

        debug!(topic = %topic, peers = peers.len(), "Rendezvous lookup");
        Ok(peers)
    }
}
