//! rmtdos server entry point.
//!
//! ```text
//! rmtdos-server                    Run in the foreground
//! rmtdos-server --config <path>    Load a custom config TOML
//! rmtdos-server --gen-config       Write default config to stdout
//! rmtdos-server -e 88b5 -b 4       Override ethertype and buffer count
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rmtdos_core::parse_ethertype;
use rmtdos_server::config::ServerConfig;
use rmtdos_server::service::{BoxError, RmtServer};

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rmtdos-server", about = "rmtdos remote screen server")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rmtdos-server.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Link type tag, in hex.
    #[arg(short, long, value_parser = parse_ethertype)]
    ethertype: Option<u16>,

    /// Receive buffers (1 to 10).
    #[arg(short, long)]
    buffers: Option<usize>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&ServerConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ServerConfig::load(&cli.config);
    if let Some(ethertype) = cli.ethertype {
        config.network.ethertype = ethertype;
    }
    if let Some(buffers) = cli.buffers {
        config.engine.buffers = buffers;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("rmtdos-server v{}", env!("CARGO_PKG_VERSION"));
    info!("link adapter: {} (broadcast {})", config.network.bind, config.network.broadcast);
    info!("screen: {}x{}", config.screen.cols, config.screen.rows);

    let server = RmtServer::bind(config).await?;
    let stop = server.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    server.run().await?;

    Ok(())
}
