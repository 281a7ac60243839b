//! Store-backed content fetcher
//!
//! Direct lookup against a centralized content-addressed store over HTTP:
//! `GET <store>/blob/<hash>`. The store is trusted to be reachable, not to
//! be honest — the payload is digest-verified like any other source.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{Result, WicketError};

use super::{verify_digest, ContentFetcher};

/// Content fetcher backed by a content-addressed store
pub struct StoreFetcher {
    base_url: String,
    client: reqwest::Client,
}

impl StoreFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WicketError::Config(format!("content store client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }
}

#[async_trait]
impl ContentFetcher for StoreFetcher {
    async fn fetch(&self, content_hash: &str) -> Result<Vec<u8>> {
        let url = format!("{}/blob/{}", self.base_url, content_hash);

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                WicketError::FetchTimeout(format!("content store: {}", e))
            } else {
                WicketError::Fetch(format!("content store: {}", e))
            }
        })?;

        if !response.status().is_success() {
            return Err(WicketError::Fetch(format!(
                "content store returned {} for {}",
                response.status(),
                content_hash
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WicketError::Fetch(format!("content store body: {}", e)))?
            .to_vec();

        verify_digest(&bytes, content_hash)?;
        debug!(hash = %content_hash, size = bytes.len(), "Fetched blob from content store");
        Ok(bytes)
    }
}
