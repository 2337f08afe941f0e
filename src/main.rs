//! portsweep - port-state reconnaissance over TCP connect, SYN and UDP.
//!
//! Usage:
//!   portsweep <TARGET> -p <PORTS> [-s connect|syn|udp] [-i IFACE] [--config PATH]

use clap::Parser;
use portsweep::cli::{self, Cli};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli::run(cli).await?;
    Ok(())
}
