//! # Credvault
//!
//! HTTP service storing per-user credentials in S3.
//!
//! ## Usage
//!
//! ```bash
//! # Serve against the configured bucket (AWS credentials from the default chain)
//! credvault serve
//!
//! # Serve against a local S3-compatible server on http://localhost:5002
//! credvault serve --local
//!
//! # Serve with an in-memory store (nothing persists)
//! credvault serve --memory --port 8080
//! ```
//!
//! All other settings come from environment variables, see [`ServiceConfig`].

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use credvault::blob::{BlobStore, MemoryBlobStore, S3BlobStore};
use credvault::config::ServiceConfig;
use credvault::identity::{IdentityExtractor, JwksFetcher, SigningKeyCache};
use credvault::observability::metrics;
use credvault::server::{start_server, ServerState, SigninProxy};
use credvault::store::CredentialStore;

/// Multi-tenant credential store
#[derive(Parser)]
#[command(name = "credvault", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Use the local S3-compatible server with path-style addressing
        #[arg(long, conflicts_with = "memory")]
        local: bool,

        /// Listen port (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Keep credentials in memory instead of object storage
        #[arg(long)]
        memory: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any client is built
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    let cli = Cli::parse();
    let mut config = ServiceConfig::from_env();
    init_tracing(&config);

    match cli.command {
        Commands::Serve {
            local,
            port,
            memory,
        } => {
            if local {
                config.use_local_storage();
            }
            if let Some(port) = port {
                config.port = port;
            }
            serve(config, memory).await
        }
    }
}

fn init_tracing(config: &ServiceConfig) {
    let level = config.log_level.to_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("credvault={level},tower_http={level}")));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_format.eq_ignore_ascii_case("text") {
        builder.with_ansi(config.log_enable_color).init();
    } else {
        builder.json().init();
    }
}

async fn serve(config: ServiceConfig, memory: bool) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_hash = env!("BUILD_GIT_HASH"),
        "Starting credvault"
    );

    metrics::register_metrics().context("Failed to register metrics")?;

    let blobs: Arc<dyn BlobStore> = if memory {
        warn!("Using in-memory storage, credentials will not persist");
        Arc::new(MemoryBlobStore::new())
    } else {
        info!(
            bucket = config.bucket.as_str(),
            region = config.region.as_str(),
            "Using S3 storage"
        );
        Arc::new(S3BlobStore::connect(&config.s3_settings()).await)
    };
    let store = CredentialStore::new(blobs, config.store_settings());

    let fetcher = JwksFetcher::new(config.jwks_url.clone(), config.key_fetch_timeout())
        .context("Failed to build signing key client")?;
    let keys = Arc::new(
        SigningKeyCache::new(Arc::new(fetcher), config.key_refresh_interval())
            .with_fetch_timeout(config.key_fetch_timeout()),
    );
    if let Err(err) = keys.refresh().await {
        warn!(error = %err, jwks_url = config.jwks_url.as_str(), "Initial signing key fetch failed, retrying on first request");
    }
    let identity = IdentityExtractor::new(keys, &config.jwt_issuer, &config.jwt_audience);

    let signin = config
        .firebase_api_key
        .as_deref()
        .map(|api_key| SigninProxy::new(&config.firebase_url, api_key, config.request_timeout()))
        .transpose()
        .context("Failed to build sign-in client")?;
    if signin.is_none() {
        warn!("FIREBASE_API_KEY not set, /users/signin is disabled");
    }

    let state = Arc::new(ServerState::new(store, identity, signin));
    start_server(config.port, state, config.request_timeout()).await
}
