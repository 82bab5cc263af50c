//! rmtdos client entry point.
//!
//! ```text
//! rmtdos-client discover                     List servers on the segment
//! rmtdos-client ping -t 02:00:00:00:80:ab    Ping one server
//! rmtdos-client watch                        Mirror the first server found
//! rmtdos-client --gen-config                 Dump default config and exit
//! ```

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rmtdos_core::{MacAddr, parse_ethertype};

use rmtdos_client::client::RmtClient;
use rmtdos_client::config::ClientConfig;
use rmtdos_client::watch::{self, WatchOptions};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "rmtdos-client", about = "rmtdos remote screen client")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "rmtdos-client.toml")]
    config: PathBuf,

    /// Server link adapter address (overrides config). Example: 192.168.1.20:8055
    #[arg(short, long)]
    server: Option<String>,

    /// Link type tag, in hex.
    #[arg(short, long, value_parser = parse_ethertype)]
    ethertype: Option<u16>,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast a status request and list the servers that answer.
    Discover,
    /// Measure round trips to a server.
    Ping {
        /// Server link identity. Discovered if omitted.
        #[arg(short, long)]
        target: Option<MacAddr>,
        #[arg(short = 'n', long, default_value_t = 4)]
        count: u32,
    },
    /// Mirror a server's screen and type stdin lines into it.
    Watch {
        /// Server link identity. Discovered if omitted.
        #[arg(short, long)]
        target: Option<MacAddr>,
        /// Do not forward stdin.
        #[arg(long)]
        no_input: bool,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&ClientConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut config = ClientConfig::load(&cli.config);
    if let Some(server) = cli.server {
        config.network.server = server;
    }
    if let Some(ethertype) = cli.ethertype {
        config.network.ethertype = ethertype;
    }

    // Logs go to stderr so watch output stays clean.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    info!("rmtdos-client v{}", env!("CARGO_PKG_VERSION"));

    let mut client = RmtClient::bind(&config).await?;

    match cli.command.unwrap_or(Command::Discover) {
        Command::Discover => {
            let found = client.discover().await?;
            if found.is_empty() {
                println!("no servers answered");
            }
            for server in found {
                let s = server.status;
                println!(
                    "{}  {}  mode {:#04x} page {}  {}x{}  cursor {},{}",
                    server.identity,
                    server.addr,
                    s.video_mode,
                    s.active_page,
                    s.cols,
                    s.rows,
                    s.cursor_row,
                    s.cursor_col
                );
            }
        }
        Command::Ping { target, count } => {
            let target = resolve_target(&mut client, target).await?;
            for seq in 0..count {
                match client.ping(target, &seq.to_be_bytes()).await? {
                    Some(rtt) => println!("pong from {target}: seq={seq} time={rtt:?}"),
                    None => println!("no reply from {target}: seq={seq}"),
                }
                if seq + 1 < count {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        Command::Watch { target, no_input } => {
            let target = resolve_target(&mut client, target).await?;
            let running = Arc::new(AtomicBool::new(true));

            // Ctrl-C handler.
            let stop = Arc::clone(&running);
            tokio::spawn(async move {
                tokio::signal::ctrl_c().await.ok();
                stop.store(false, Ordering::SeqCst);
            });

            let options = WatchOptions {
                keepalive: config.keepalive(),
                newline: config.watch.newline,
                forward_stdin: !no_input,
            };
            let watcher = watch::run(&mut client, target, options, running, io::stdout()).await?;
            info!(chunks = watcher.chunks(), "watch ended");
        }
    }

    Ok(())
}

/// Use `target` if given, otherwise the first server that answers
/// discovery.
async fn resolve_target(client: &mut RmtClient, target: Option<MacAddr>) -> Result<MacAddr, BoxError> {
    if let Some(target) = target {
        return Ok(target);
    }
    let found = client.discover().await?;
    let first = found.first().ok_or("no servers answered discovery")?;
    info!(identity = %first.identity, addr = %first.addr, "using discovered server");
    client.set_server(first.addr);
    Ok(first.identity)
}
