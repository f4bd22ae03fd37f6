//! Gateway binary: CLI config, tracing setup, axum serve loop.

use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use tracing_subscriber::EnvFilter;
use url::Url;
use vitrine_gateway::{GatewayState, build_router};
use vitrine_store::HttpObjectStore;

#[derive(Parser, Debug)]
#[command(name = "vitrine-gateway", about = "Streaming object proxy for Vitrine clients")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "VITRINE_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Backing object-store endpoint (S3-compatible, path-style).
    #[arg(long, env = "VITRINE_STORE_ENDPOINT")]
    store_endpoint: Url,

    /// Public base URL clients use to reach this gateway. Rewritten playlist
    /// references are rooted here. Defaults to `http://<bind>`.
    #[arg(long, env = "VITRINE_PUBLIC_BASE")]
    public_base: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let public_base = args
        .public_base
        .unwrap_or_else(|| format!("http://{}", args.bind));

    let state = GatewayState {
        store: Arc::new(HttpObjectStore::new(args.store_endpoint.clone())),
        public_base,
    };

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(bind = %args.bind, store = %args.store_endpoint, "gateway listening");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    Ok(())
}
