//! # NATNEG Server
//!
//! Runs the NAT negotiation coordinator until Ctrl-C.
//!
//! ## Usage
//!
//! ```bash
//! natneg_server --config natneg.toml --bind 0.0.0.0:27901
//! ```
//!
//! Log verbosity follows `RUST_LOG` and defaults to `info`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use gamespy_natneg::{NatNegConfig, NatNegServer};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "natneg_server", version, about = "GameSpy NAT negotiation server")]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the bind address
    #[arg(short, long)]
    bind: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => match NatNegConfig::from_toml_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => NatNegConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }

    let server = match NatNegServer::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start: {}", e);
            return ExitCode::FAILURE;
        }
    };

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl-C: {}", e);
            }
        })
        .await;

    let stats = server.stats();
    let transport = server.transport_stats();
    tracing::info!(
        "Sessions created: {}, expired: {}, dropped packets: {}, connect requests: {}",
        stats.sessions_created,
        stats.sessions_expired,
        stats.packets_dropped,
        stats.connect_requests_sent
    );
    tracing::info!(
        "Packets in: {}, out: {}, send errors: {}",
        transport.packets_received,
        transport.packets_sent,
        transport.send_errors
    );

    ExitCode::SUCCESS
}
