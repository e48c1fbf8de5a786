use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use shop_stub::{StubFaults, StubServices};
use tokio::signal;
use tracing::{info, warn};

/// Serve local stand-ins for the product and order services until ctrl-c.
#[derive(Parser, Debug)]
#[command(name = "shop-stub", version)]
struct Cli {
    #[arg(long, default_value = "127.0.0.1:8000")]
    product_addr: SocketAddr,
    #[arg(long, default_value = "127.0.0.1:8001")]
    order_addr: SocketAddr,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let services = StubServices::bind(cli.product_addr, cli.order_addr, StubFaults::default())
        .await
        .context("failed to start stub services")?;
    info!(
        product = services.product_url(),
        order = services.order_url(),
        "stub services up; press ctrl-c to stop"
    );
    if let Err(err) = signal::ctrl_c().await {
        warn!(?err, "failed to listen for shutdown signal");
    }
    info!("shutdown signal received");
    services.shutdown().await;
    Ok(())
}

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
