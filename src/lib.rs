//! Wicket - browser gateway for content-addressed application chains
//!
//! Lets plain web browsers act as users of permissionless application
//! chains: each chain is named by a content hash (GCI), serves its own
//! browser client from peer-distributed bundles, and gets per-user
//! per-chain signing keys held custodially by the gateway.

pub mod bundle;
pub mod canonical;
pub mod chain;
pub mod config;
pub mod error;
pub mod fetch;
pub mod keys;
pub mod rendezvous;
pub mod routes;
pub mod server;

pub use config::Args;
pub use error::{Result, WicketError};
pub use server::{run, AppState};
