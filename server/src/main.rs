mod routes;
mod stage;

use anyhow::Result;
use clap::Parser;
use log::LevelFilter;
use routes::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

/// Serve the Icarus playground over HTTP.
#[derive(Debug, Parser)]
struct Flags {
    /// Port to listen on
    #[clap(long, default_value_t = 8787)]
    port: u16,

    /// Path to the compiler binary
    #[clap(long)]
    compiler: PathBuf,

    /// Path to the compiler's standard-library module directory
    #[clap(long)]
    stdlib: PathBuf,

    /// Directory of example source files
    #[clap(long)]
    examples: PathBuf,

    /// Log level filter
    #[clap(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let flags = Flags::parse();
    env_logger::Builder::new()
        .filter_level(flags.log_level.parse().unwrap_or(LevelFilter::Info))
        .init();

    let staging = stage::Staging::prepare(&flags.compiler, &flags.stdlib, &flags.examples)?;
    let state = AppState::new(staging.tool_config(), staging.examples_dir());
    let app = routes::router(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], flags.port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // abandon any still-running children; nothing survives a restart
    state.table.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
