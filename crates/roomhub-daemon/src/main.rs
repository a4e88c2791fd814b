//! Roomhub daemon entry point.
//!
//! Starts the room listener, the alarm trigger watch and, unless disabled,
//! the operator console.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use roomhub_core::config::{Directories, HubConfig};
use roomhub_daemon::{Hub, console, run_trigger_watch, server};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Roomhub daemon - central hub for room controllers
#[derive(Parser, Debug)]
#[command(name = "roomhub")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (defaults to `$XDG_CONFIG_HOME/roomhub/config.json`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Listen address, overriding the config file
    #[arg(long, value_name = "ADDR")]
    bind: Option<String>,

    /// Run without the interactive console
    #[arg(long)]
    no_console: bool,
}

/// Set up logging with file output for debugging.
/// In debug builds, defaults to debug level and logs to timestamped file.
/// In release builds, defaults to info level and logs to stderr.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("roomhub={default_level}")));

    if cfg!(debug_assertions) {
        let temp_dir = std::env::temp_dir();
        let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let log_filename = format!("roomhub-{timestamp}.log");
        let log_path = temp_dir.join(&log_filename);

        #[cfg(unix)]
        {
            let symlink_path = temp_dir.join("roomhub.log");
            let _ = std::fs::remove_file(&symlink_path);
            let _ = std::os::unix::fs::symlink(&log_path, &symlink_path);
        }

        let file_appender = tracing_appender::rolling::never(&temp_dir, &log_filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        std::mem::forget(guard);

        let file_layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_line_number(true);

        let stderr_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(file_layer)
            .with(stderr_layer)
            .with(filter)
            .init();

        eprintln!("Logging to: {} (and stderr)", log_path.display());
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    setup_logging();

    info!("Starting roomhub...");

    let dirs = Directories::new();
    dirs.ensure_exists()?;
    let config_path = args.config.unwrap_or_else(|| dirs.config_file.clone());
    let mut config = HubConfig::load(&config_path)?;
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let hub = Arc::new(Hub::open(config, &dirs)?);

    tokio::spawn(run_trigger_watch(hub.clone()));
    tokio::spawn(console::log_snapshots(hub.clone()));
    if !args.no_console {
        tokio::spawn(console::run_console(hub.clone()));
    }

    let ctrl_c_hub = hub.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => ctrl_c_hub.shutdown().await,
            Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let result = server::run(hub.clone()).await;
    hub.shutdown().await;
    result?;

    info!("Roomhub stopped");
    Ok(())
}
