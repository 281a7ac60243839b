//! Gateway server
//!
//! Process-scoped context ([`AppState`]), lifecycle hooks, and the hyper
//! HTTP listener in [`http`].

pub mod http;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::bundle::BundleStore;
use crate::chain::ConnectionPool;
use crate::config::Args;
use crate::error::Result;
use crate::keys::KeyService;

pub use http::run;

/// Shared application state
pub struct AppState {
    pub args: Args,
    pub pool: Arc<ConnectionPool>,
    pub bundles: Arc<BundleStore>,
    pub keys: Arc<KeyService>,
    pub started: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        pool: Arc<ConnectionPool>,
        bundles: Arc<BundleStore>,
        keys: Arc<KeyService>,
    ) -> Self {
        Self {
            args,
            pool,
            bundles,
            keys,
            started: Instant::now(),
        }
    }
}

/// Lifecycle observer for the gateway process
pub trait GatewayHook: Send + Sync {
    /// Called once after state construction, before the listener binds
    fn on_init(&self, _state: &AppState) {}

    /// Called once the listener is accepting connections
    fn on_listen(&self, _addr: SocketAddr) {}
}

/// Built-in hook that prints the connect hint once the gateway is up
pub struct ConnectBanner;

impl GatewayHook for ConnectBanner {
    fn on_listen(&self, addr: SocketAddr) {
        info!("Open http://{}/<chain-id>/ in a browser to use a chain's app", addr);
    }
}
