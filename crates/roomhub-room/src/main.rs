//! Roomhub room simulator
//!
//! Connects to the hub as a room controller with an in-memory device set.
//! Device changes are typed on stdin; the hub's posts are answered as real
//! hardware would.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use roomhub_rpc::RoomClient;
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod controller;
mod driver;

use driver::{DeviceDriver, MemoryDriver};

/// Roomhub room simulator
#[derive(Parser, Debug)]
#[command(name = "roomhub-room")]
#[command(version, about, long_about = None)]
#[command(after_help = "\
Examples:
  roomhub-room --name \"Lab 1\"
  roomhub-room --hub 10.0.0.2:10000 --local 0.0.0.0:40001")]
struct Cli {
    /// Hub address
    #[arg(long, default_value = "127.0.0.1:10000")]
    hub: SocketAddr,

    /// Room label sent at registration
    #[arg(long, default_value = "Room")]
    name: String,

    /// Fixed local address; the hub recognises the room by it
    #[arg(long, value_name = "ADDR")]
    local: Option<SocketAddr>,

    /// Seconds between periodic pushes
    #[arg(long, default_value_t = 5)]
    push_interval: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn setup_logging(debug_flag: bool) {
    let level = if debug_flag || cfg!(debug_assertions) {
        "roomhub=debug"
    } else {
        "roomhub=info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.debug);

    let client = match cli.local {
        Some(local) => RoomClient::connect_from(local, cli.hub).await,
        None => RoomClient::connect(cli.hub).await,
    };
    let mut client = client.with_context(|| format!("Failed to connect to hub at {}", cli.hub))?;

    let driver = MemoryDriver::default_room();
    let ack = client
        .register(&cli.name, driver.devices())
        .await
        .context("Registration failed")?;
    println!("Registered as {} (room {})", ack.name, ack.room_id);
    println!("{}", controller::HELP);

    let stdin = BufReader::new(tokio::io::stdin());
    let interval = Duration::from_secs(cli.push_interval.max(1));
    controller::run(client, driver, interval, stdin).await
}
