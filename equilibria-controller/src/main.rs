//! Equilibria controller: entry point.
//!
//! ```text
//! equilibria-controller                  Run in the foreground
//! equilibria-controller --config <path>  Load a custom config TOML
//! equilibria-controller --gen-config     Write default config to stdout
//! equilibria-controller --port 7010      Override the IPC port
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use equilibria_controller::config::ControllerConfig;
use equilibria_controller::service::ControllerService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "equilibria-controller", about = "Equilibria process controller IPC endpoint")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "equilibria-controller.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Override `network.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `network.port`.
    #[arg(short, long)]
    port: Option<u16>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ControllerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ControllerConfig::load(&cli.config);
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("equilibria-controller v{}", env!("CARGO_PKG_VERSION"));
    info!("IPC endpoint: {}:{}", config.network.host, config.network.port);
    match config.frame_addr() {
        Some(addr) => info!("binary frame stream: {addr}"),
        None => info!("binary frame stream disabled"),
    }
    info!(
        "tick {:?}, telemetry every {:?}",
        config.tick(),
        config.publish_interval()
    );
    if config.network.host != "127.0.0.1" && config.network.host != "localhost" {
        warn!("binding {}: the protocol is unauthenticated", config.network.host);
    }

    let service = ControllerService::bind(config).await?;
    let shutdown = service.shutdown_token();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        shutdown.cancel();
    });

    service.run().await?;

    Ok(())
}
