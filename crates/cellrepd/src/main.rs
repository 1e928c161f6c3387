//! cellrepd: a cell representative daemon backed by a simulated executor.
//!
//! Serves the auction API on the securable listener and the operator API
//! on the plaintext one. Also carries a small client mode for querying
//! another cell's state with the same TLS settings.
//!
//! # Usage
//!
//! ```text
//! cellrepd serve --config /etc/cellrep/rep.toml
//! cellrepd state --config /etc/cellrep/rep.toml --address 10.0.0.5:1800 --rep-url https://10.0.0.5:1801
//! ```

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use cellrep_api::server::{serve_plain, serve_tls, server_tls_config};
use cellrep_api::{AuctionCellRep, EvacuationFlag, RepState, SimExecutor, insecure_router, secure_router};
use cellrep_client::ClientFactory;

use crate::config::CellRepConfig;

#[derive(Parser)]
#[command(name = "cellrepd", about = "Cell representative daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the cell representative.
    Serve {
        /// Path to the TOML config file.
        #[arg(long)]
        config: PathBuf,
    },
    /// Fetch and print another cell's state.
    State {
        #[arg(long)]
        config: PathBuf,

        /// The cell's plain address.
        #[arg(long)]
        address: String,

        /// The cell's announced rep URL, if any.
        #[arg(long)]
        rep_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,cellrepd=debug,cellrep=debug")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config } => serve(CellRepConfig::from_file(&config)?).await,
        Command::State {
            config,
            address,
            rep_url,
        } => print_state(CellRepConfig::from_file(&config)?, &address, rep_url.as_deref()).await,
    }
}

async fn serve(config: CellRepConfig) -> anyhow::Result<()> {
    let executor = Arc::new(SimExecutor::new(config.sim.capacity(), config.sim.volume_drivers.clone()));
    let rep = AuctionCellRep::new(config.cell_settings()?, executor, EvacuationFlag::default());
    let state = RepState { rep: Arc::new(rep) };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let insecure = TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let securable = TcpListener::bind(config.listen_addr_securable)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr_securable))?;

    info!(
        cell_id = %config.cell_id,
        zone = %config.zone,
        require_tls = config.require_tls,
        "cell rep starting"
    );

    let operator = tokio::spawn(serve_plain(insecure, insecure_router(state.clone()), shutdown_rx.clone()));

    let auction = match config.server_tls_files() {
        Some((cert, key, ca)) => {
            let tls = server_tls_config(cert, key, Some(ca)).context("failed to build server TLS config")?;
            tokio::spawn(serve_tls(securable, tls, secure_router(state), shutdown_rx))
        }
        None => {
            warn!("serving the auction API without TLS");
            tokio::spawn(serve_plain(securable, secure_router(state), shutdown_rx))
        }
    };

    tokio::signal::ctrl_c().await.context("failed to install CTRL+C handler")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    operator.await??;
    auction.await??;
    info!("cell rep stopped");
    Ok(())
}

async fn print_state(config: CellRepConfig, address: &str, rep_url: Option<&str>) -> anyhow::Result<()> {
    let factory = ClientFactory::new(
        config.communication_timeout()?,
        config.state_timeout()?,
        config.client_tls(),
    )?;
    let client = factory.create_client(address, rep_url)?;
    let state = client
        .state()
        .await
        .with_context(|| format!("failed to fetch state from {}", client.address()))?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}
