//! Wicket - browser gateway for content-addressed application chains

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wicket::{
    bundle::BundleStore,
    chain::{ConnectionPool, RemoteConnector},
    config::Args,
    fetch::{ContentFetcher, StoreFetcher, SwarmFetcher},
    keys::{KeyService, KeyStore},
    rendezvous::{HttpRendezvous, PeerDirectory},
    server::{self, AppState, ConnectBanner, GatewayHook},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("wicket={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Wicket - chain gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Home: {}", args.home_dir().display());
    info!("Rendezvous: {}", args.rendezvous_url);
    match args.node_url {
        Some(ref url) => info!("Full node: {} (pinned)", url),
        None => info!("Full node: discovered via rendezvous"),
    }
    match args.content_store_url {
        Some(ref url) => info!("Bundle source: content store at {}", url),
        None => info!("Bundle source: peer swarm"),
    }
    info!("Build: {} ({})", env!("GIT_COMMIT_SHORT"), env!("BUILD_TIMESTAMP"));
    info!("======================================");

    std::fs::create_dir_all(args.home_dir())?;
    std::fs::create_dir_all(args.clients_dir())?;

    let request_timeout = Duration::from_millis(args.request_timeout_ms);
    let fetch_timeout = Duration::from_millis(args.fetch_timeout_ms);

    let directory: Arc<dyn PeerDirectory> =
        Arc::new(HttpRendezvous::new(&args.rendezvous_url, request_timeout)?);

    let fetcher: Arc<dyn ContentFetcher> = match args.content_store_url {
        Some(ref url) => Arc::new(StoreFetcher::new(url, fetch_timeout)?),
        None => Arc::new(SwarmFetcher::new(
            Arc::clone(&directory),
            fetch_timeout,
            args.max_bundle_bytes,
        )),
    };

    let connector = RemoteConnector::new(
        Arc::clone(&directory),
        args.node_url.clone(),
        request_timeout,
    )?;
    let pool = Arc::new(ConnectionPool::new(Arc::new(connector)));
    let bundles = Arc::new(BundleStore::new(args.clients_dir(), fetcher));
    let keys = Arc::new(KeyService::new(KeyStore::open(args.key_store_path())?));

    let state = Arc::new(AppState::new(args, pool, bundles, keys));

    // Pre-warm the connection for a chain named on the command line
    if let Some(chain) = state.args.chain.clone() {
        match state.pool.get(&chain).await {
            Ok(_) => info!(gci = %chain, "Pre-connected to chain"),
            Err(e) => warn!(gci = %chain, error = %e, "Pre-connect failed, will retry on demand"),
        }
    }

    let hooks: Vec<Box<dyn GatewayHook>> = vec![Box::new(ConnectBanner)];
    server::run(state, hooks).await?;
    Ok(())
}
