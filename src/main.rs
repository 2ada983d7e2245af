//! Kasplex relayer
//!
//! Entry point for the relayer that accepts Ethereum JSON-RPC, relays
//! `eth_sendRawTransaction` payloads onto Kaspa and proxies everything else
//! to an EVM node.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use kasplex_relayer::config::Config;
use kasplex_relayer::kaspa::{PoolConfig, RpcClientPool, WsConnector};
use kasplex_relayer::server::{RelayerService, RelayerState};
use kasplex_relayer::wallet::{SigningIdentity, Wallet};

#[derive(Parser)]
#[command(name = "kasplex-relayer", version, about = "Relay EVM transactions onto Kaspa")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the relayer
    Run {
        /// Env file with RELAYER_* settings
        #[arg(short = 'c', long = "env-file", value_name = "FILE")]
        env_file: Option<PathBuf>,
    },
    /// Print version and build information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    match Cli::parse().command {
        Command::Version => {
            print_version();
            Ok(())
        }
        Command::Run { env_file } => run(env_file).await,
    }
}

fn print_version() {
    println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
    println!(
        "os/arch: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
}

async fn run(env_file: Option<PathBuf>) -> Result<()> {
    match &env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("Failed to load env file {}", path.display()))?;
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    info!("=== Kasplex Relayer ===");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    info!("Configuration:");
    info!("  Port: {}", config.port);
    info!("  EVM RPC: {}", config.eth_rpc_url);
    info!("  Kaspa RPC: {}", config.kas_rpc_url);
    info!("  Network: {}", config.network_prefix);
    info!("  Destination: {}", config.to_address);

    let identity = SigningIdentity::from_hex(&config.private_key, &config.network_prefix)
        .context("Failed to load relayer signing key")?;
    info!("  Relayer address: {}", identity.address());

    let pool = RpcClientPool::new(
        WsConnector::new(&config.kas_rpc_url),
        PoolConfig {
            size: config.pool_size,
            ..PoolConfig::default()
        },
    );
    let wallet = Arc::new(Wallet::new(identity, pool));

    let mut service = RelayerService::new(config.port, RelayerState::new(&config, wallet.clone()));
    service.start().await?;
    info!("Started successfully");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");

    service.stop().await?;
    wallet.close().await;
    info!("Stopped gracefully");

    Ok(())
}
