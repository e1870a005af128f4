//! Entry point. Parses configuration, wires up the `App` aggregate, spawns
//! every background subsystem, then blocks until Ctrl-C or SIGTERM and
//! waits for a clean shutdown.

use ckpool_node::{App, Cli};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    print_banner();

    let cli = Cli::parse();
    let app = App::new(cli)?;

    let handles = app.spawn_subsystems().await?;
    info!(tasks = handles.len(), "all subsystems started");

    wait_for_shutdown_signal().await;
    app.shutdown.initiate();

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "a subsystem task panicked during shutdown");
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn init_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn print_banner() {
    println!();
    println!("  ckpool-node v{}", env!("CARGO_PKG_VERSION"));
    println!("  stratum mining-pool infrastructure node");
    println!();
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("🛑 received SIGINT"),
        _ = sigterm.recv() => info!("🛑 received SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
    info!("🛑 received ctrl-c");
}
