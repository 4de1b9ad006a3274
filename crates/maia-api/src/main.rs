//! MAIA API service binary

use clap::Parser;
use maia_api::{bootstrap, build_app, shutdown, ApiConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "maia-api")]
#[command(about = "MAIA multi-tenant memory service")]
struct Args {
    /// Bind address, overriding MAIA_BIND
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = ApiConfig::from_env();
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    let bind = config.bind.clone();

    let state = bootstrap(config).await?;
    let app = build_app(state.clone());

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!(bind = %bind, "MAIA API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    shutdown(&state).await;
    Ok(())
}
