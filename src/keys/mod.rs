//! Per-user, per-chain key management
//!
//! Each (user, chain) pair gets its own Ed25519 keypair, derived from a
//! random seed persisted in the key store. Scoping keys per chain means a
//! signature obtained for one chain front-end carries no authority on any
//! other chain.
//!
//! The public key is served without restriction; signing is gated by an
//! origin-binding check on the requester's declared source page.

pub mod service;
pub mod store;

pub use service::KeyService;
pub use store::KeyStore;
