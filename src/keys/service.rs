//! Key & signing service
//!
//! Derives, persists, and uses per-(user, chain) Ed25519 keypairs on top of
//! the [`KeyStore`]. The first request for a pair generates a fresh random
//! seed; every later request derives the same keypair from the stored seed.
//!
//! # Origin binding
//!
//! `sign` refuses to produce a signature unless the request's declared
//! source page lives under the same chain identifier being signed for: the
//! path segment immediately following the origin of the referring URL must
//! equal the target GCI. A missing or unparseable referer is rejected the
//! same way. Public-key lookup carries no authority and stays open.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use dashmap::DashMap;
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use url::Url;
use zeroize::Zeroizing;

use crate::canonical;
use crate::error::{Result, WicketError};

use super::store::{KeyStore, SEED_LEN};

/// Per-user, per-chain signing service
pub struct KeyService {
    store: KeyStore,
    /// Serializes check-then-create per (user, chain) pair so concurrent
    /// first requests cannot race into two different seeds
    pair_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyService {
    pub fn new(store: KeyStore) -> Self {
        Self {
            store,
            pair_locks: DashMap::new(),
        }
    }

    /// Look up or create the keypair for a (user, chain) pair.
    ///
    /// Idempotent: the derived keypair is a pure function of the stored
    /// seed, so repeated calls always return the same key.
    pub async fn get_or_create(&self, user_id: &str, gci: &str) -> Result<SigningKey> {
        let index = pair_index(user_id, gci);

        let lock = self
            .pair_locks
            .entry(index.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let seed = match self.store.get_seed(&index)? {
            Some(seed) => Zeroizing::new(seed),
            None => {
                let mut fresh = Zeroizing::new([0u8; SEED_LEN]);
                OsRng.fill_bytes(&mut *fresh);
                let stored = self.store.create_seed_if_absent(&index, &fresh)?;
                debug!(gci = %gci, "Generated keypair for new (user, chain) pair");
                Zeroizing::new(stored)
            }
        };

        Ok(SigningKey::from_bytes(&seed))
    }

    /// Base64 public key for a (user, chain) pair, creating the pair's
    /// keypair on first use. No access restriction.
    pub async fn public_key(&self, user_id: &str, gci: &str) -> Result<String> {
        let key = self.get_or_create(user_id, gci).await?;
        Ok(BASE64.encode(key.verifying_key().to_bytes()))
    }

    /// Sign the canonical encoding of `payload` with the (user, chain) key.
    ///
    /// The origin-binding check runs before any key material is touched:
    /// a rejected request creates nothing and signs nothing.
    pub async fn sign(
        &self,
        user_id: &str,
        gci: &str,
        referer: Option<&str>,
        payload: &Value,
    ) -> Result<String> {
        check_origin(referer, gci)?;

        let key = self.get_or_create(user_id, gci).await?;
        let bytes = canonical::to_bytes(payload);
        let signature = key.sign(&bytes);
        Ok(BASE64.encode(signature.to_bytes()))
    }

    /// Whether a seed exists for a (user, chain) pair
    pub fn has_keypair(&self, user_id: &str, gci: &str) -> Result<bool> {
        self.store.contains(&pair_index(user_id, gci))
    }
}

fn pair_index(user_id: &str, gci: &str) -> String {
    format!("{}:{}", user_id, gci)
}

/// Origin-binding check: the declared source page's first path segment must
/// name the chain being signed for.
pub fn check_origin(referer: Option<&str>, gci: &str) -> Result<()> {
    let referer = referer.ok_or_else(|| {
        WicketError::Authorization("signing request declared no source page".into())
    })?;

    let url = Url::parse(referer)
        .map_err(|e| WicketError::Authorization(format!("invalid source page URL: {}", e)))?;

    let first_segment = url
        .path_segments()
        .and_then(|mut segments| segments.next())
        .filter(|s| !s.is_empty());

    match first_segment {
        Some(segment) if segment == gci => Ok(()),
        _ => Err(WicketError::Authorization(
            "you may only sign transactions for the chain whose app you are using".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::Verifier;
    use serde_json::json;

    fn service() -> KeyService {
        KeyService::new(KeyStore::ephemeral().unwrap())
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let service = service();

        let first = service.public_key("user-1", "chainA").await.unwrap();
        let second = service.public_key("user-1", "chainA").await.unwrap();
        assert_eq!(first, second);

        // A different pair gets a different key
        let other = service.public_key("user-1", "chainB").await.unwrap();
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_agrees_on_one_seed() {
        let service = Arc::new(service());

        let mut handles = Vec::new();
        for _ in 0..8 {
            let service = Arc::clone(&service);
            handles.push(tokio::spawn(async move {
                service.public_key("user-1", "chainA").await.unwrap()
            }));
        }

        let mut keys = Vec::new();
        for handle in handles {
            keys.push(handle.await.unwrap());
        }
        assert!(keys.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test]
    async fn test_sign_and_verify() {
        let service = service();
        let payload = json!({"amount": 5});

        let signature = service
            .sign(
                "user-1",
                "chainA",
                Some("https://gateway/chainA/app"),
                &payload,
            )
            .await
            .unwrap();

        let public = service.public_key("user-1", "chainA").await.unwrap();
        let verifying = ed25519_dalek::VerifyingKey::from_bytes(
            &BASE64.decode(public).unwrap().try_into().unwrap(),
        )
        .unwrap();
        let sig = ed25519_dalek::Signature::from_bytes(
            &BASE64.decode(signature).unwrap().try_into().unwrap(),
        );

        let bytes = canonical::to_bytes(&payload);
        assert!(verifying.verify(&bytes, &sig).is_ok());
    }

    #[tokio::test]
    async fn test_equal_payloads_sign_identically() {
        let service = service();
        let referer = Some("https://gateway/chainA/app");

        let a: Value = serde_json::from_str(r#"{"to":"bob","amount":5}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"amount":5,"to":"bob"}"#).unwrap();

        let sig_a = service.sign("u", "chainA", referer, &a).await.unwrap();
        let sig_b = service.sign("u", "chainA", referer, &b).await.unwrap();
        assert_eq!(sig_a, sig_b);
    }

    #[tokio::test]
    async fn test_sign_rejects_mismatched_origin() {
        let service = service();

        let result = service
            .sign(
                "user-1",
                "chainB",
                Some("https://gateway/chainA/app"),
                &json!({"amount": 5}),
            )
            .await;

        assert!(matches!(result, Err(WicketError::Authorization(_))));
        // Policy rejection touches no key material
        assert!(!service.has_keypair("user-1", "chainB").unwrap());
    }

    #[tokio::test]
    async fn test_sign_rejects_missing_referer() {
        let service = service();

        let result = service
            .sign("user-1", "chainA", None, &json!({"amount": 5}))
            .await;

        assert!(matches!(result, Err(WicketError::Authorization(_))));
        assert!(!service.has_keypair("user-1", "chainA").unwrap());
    }

    #[test]
    fn test_check_origin() {
        assert!(check_origin(Some("https://gw/chainA/app"), "chainA").is_ok());
        assert!(check_origin(Some("https://gw/chainA/"), "chainA").is_ok());
        assert!(check_origin(Some("https://gw/chainA"), "chainA").is_ok());
        assert!(check_origin(Some("https://gw/chainB/app"), "chainA").is_err());
        assert!(check_origin(Some("https://gw/"), "chainA").is_err());
        assert!(check_origin(Some("not a url"), "chainA").is_err());
        assert!(check_origin(None, "chainA").is_err());
    }
}
