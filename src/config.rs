//! Configuration for wicket
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use uuid::Uuid;

/// Wicket - browser gateway for content-addressed application chains
#[derive(Parser, Debug, Clone)]
#[command(name = "wicket")]
#[command(about = "Serve chain state, signing keys, and client bundles to browsers")]
pub struct Args {
    /// Chain identifier to pre-connect to at startup (optional)
    #[arg(value_name = "GCI")]
    pub chain: Option<String>,

    /// Unique node identifier for this gateway instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:7777")]
    pub listen: SocketAddr,

    /// Home directory for persisted state (key store, extracted bundles)
    /// Defaults to ~/.wicket
    #[arg(long, env = "WICKET_HOME")]
    pub home: Option<PathBuf>,

    /// Rendezvous service URL for discovering full nodes and bundle peers
    #[arg(long, env = "RENDEZVOUS_URL", default_value = "http://localhost:7780")]
    pub rendezvous_url: String,

    /// Full node URL override (skips rendezvous lookup for chain connections)
    #[arg(long, env = "NODE_URL")]
    pub node_url: Option<String>,

    /// Content store URL; when set, bundles are fetched from this
    /// content-addressed store instead of the peer swarm
    #[arg(long, env = "CONTENT_STORE_URL")]
    pub content_store_url: Option<String>,

    /// Bound on how long a content fetch may wait for a matching source
    #[arg(long, env = "FETCH_TIMEOUT_MS", default_value = "30000")]
    pub fetch_timeout_ms: u64,

    /// Timeout for chain node requests in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "10000")]
    pub request_timeout_ms: u64,

    /// Maximum accepted bundle payload size in bytes
    #[arg(long, env = "MAX_BUNDLE_BYTES", default_value = "67108864")]
    pub max_bundle_bytes: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Effective home directory (falls back to ~/.wicket)
    pub fn home_dir(&self) -> PathBuf {
        self.home.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".wicket")
        })
    }

    /// Key store path under the home directory
    pub fn key_store_path(&self) -> PathBuf {
        self.home_dir().join("keys")
    }

    /// Root directory for extracted client bundles
    pub fn clients_dir(&self) -> PathBuf {
        self.home_dir().join("clients")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.fetch_timeout_ms == 0 {
            return Err("FETCH_TIMEOUT_MS must be greater than zero".to_string());
        }
        if let Some(ref chain) = self.chain {
            if !crate::chain::is_valid_gci(chain) {
                return Err(format!("invalid chain identifier: {}", chain));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["wicket"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.listen.port(), 7777);
        assert_eq!(args.fetch_timeout_ms, 30000);
        assert!(args.content_store_url.is_none());
    }

    #[test]
    fn test_home_layout() {
        let mut args = base_args();
        args.home = Some(PathBuf::from("/tmp/wicket-test"));
        assert_eq!(args.key_store_path(), PathBuf::from("/tmp/wicket-test/keys"));
        assert_eq!(args.clients_dir(), PathBuf::from("/tmp/wicket-test/clients"));
    }

    #[test]
    fn test_validate_rejects_bad_chain_arg() {
        let mut args = base_args();
        args.chain = Some("../escape".to_string());
        assert!(args.validate().is_err());

        args.chain = Some("abc123".to_string());
        assert!(args.validate().is_ok());
    }
}
