//! nexus-server: serves the demo router over HTTP.

use clap::Parser;
use nexus_app::build_dispatcher;
use nexus_app::rpc::AppState;
use nexus_rpc::{BatchConfig, RpcConfig, server};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nexus-server")]
#[command(about = "Demo nexus-rpc server", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "NEXUS_BIND", default_value = "127.0.0.1:3000")]
    bind: String,

    /// Mount point of the RPC endpoints
    #[arg(long, env = "NEXUS_BASE_PATH", default_value = "/api/rpc")]
    base_path: String,

    /// Largest batch a client may send
    #[arg(long, env = "NEXUS_MAX_BATCH_SIZE", default_value_t = 100)]
    max_batch_size: usize,

    /// Pause between teststream messages, in milliseconds
    #[arg(long, env = "NEXUS_STREAM_INTERVAL_MS", default_value_t = 1000)]
    stream_interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nexus_rpc=debug,nexus_app=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let config = RpcConfig::new()
        .with_base_path(args.base_path.clone())
        .with_batch_config(BatchConfig::new().with_max_batch_size(args.max_batch_size));
    config.validate()?;

    let state = AppState::new(Duration::from_millis(args.stream_interval_ms));
    let dispatcher = build_dispatcher(state, config)?;

    tracing::info!(
        bind = %args.bind,
        base_path = %args.base_path,
        max_batch_size = args.max_batch_size,
        stream_interval_ms = args.stream_interval_ms,
        "Configuration loaded"
    );

    let listener = TcpListener::bind(&args.bind).await?;
    server::serve(listener, dispatcher, shutdown_signal()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Wait for Ctrl+C.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
