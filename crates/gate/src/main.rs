//! z402 Paywall Node
//!
//! Serves one route gated behind a Solana micropayment. Incoming payment
//! transactions are verified, broadcast and confirmed before the request is
//! let through.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use z402_core::{types::unix_millis, DEFAULT_PENDING_TIMEOUT_MS, DEFAULT_RESEND_INTERVAL_MS};
use z402_rpc::RpcNetwork;
use z402_server::PaywallServer;

mod config;

use config::{GateConfig, LedgerBackend};

/// z402 paywall node
#[derive(Parser, Debug)]
#[command(name = "z402")]
#[command(about = "HTTP paywall settled by Solana micropayments", long_about = None)]
struct Args {
    /// Solana JSON-RPC endpoint
    #[arg(long, default_value = "https://api.devnet.solana.com")]
    rpc_url: String,

    /// HTTP bind address
    #[arg(long, default_value = "127.0.0.1:3402")]
    bind_addr: String,

    /// Path of the protected route
    #[arg(long, default_value = "/paid")]
    route_path: String,

    /// Payee wallet (base58)
    #[arg(long)]
    destination: String,

    /// Price in base units (lamports or raw token units)
    #[arg(long)]
    amount: String,

    /// SPL mint; native SOL when omitted
    #[arg(long)]
    mint: Option<String>,

    /// Age in milliseconds after which a pending payment is re-checked on chain
    #[arg(long, default_value_t = DEFAULT_PENDING_TIMEOUT_MS)]
    pending_timeout_ms: u64,

    /// Resubmission interval in milliseconds
    #[arg(long, default_value_t = DEFAULT_RESEND_INTERVAL_MS)]
    resend_interval_ms: u64,

    /// Broadcast deadline in milliseconds (defaults to the pending timeout)
    #[arg(long)]
    confirm_timeout_ms: Option<u64>,

    /// Ledger backend for pending payments
    #[arg(long, value_enum, default_value = "memory")]
    ledger: LedgerBackend,

    /// Data directory for persistent state
    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl From<Args> for GateConfig {
    fn from(args: Args) -> Self {
        Self {
            rpc_url: args.rpc_url,
            bind_addr: args.bind_addr,
            route_path: args.route_path,
            destination: args.destination,
            amount: args.amount,
            mint: args.mint,
            pending_timeout_ms: args.pending_timeout_ms,
            resend_interval_ms: args.resend_interval_ms,
            confirm_timeout_ms: args.confirm_timeout_ms,
            ledger: args.ledger,
            data_dir: args.data_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    run(args.into()).await
}

async fn run(config: GateConfig) -> Result<()> {
    let route = config.route()?;

    tracing::info!("Starting z402 paywall");
    tracing::info!("  RPC: {}", config.rpc_url);
    tracing::info!("  HTTP: {}", config.bind_addr);
    tracing::info!("  Route: {} -> {}", config.route_path, route.quote());
    tracing::info!("  Ledger: {:?}", config.ledger);

    let network = Arc::new(RpcNetwork::new(&config.rpc_url)?);
    let gate = Arc::new(config.build_gate(network)?);

    // Rows left behind by a previous run resolve on their next retry
    let stuck = gate.pending_report().await?;
    if !stuck.is_empty() {
        tracing::warn!("{} pending payments awaiting resolution", stuck.len());
        let now = unix_millis();
        for record in &stuck {
            tracing::debug!(
                "  {} from {} on {} ({} ms old)",
                record.signature,
                record.from,
                record.route,
                record.age_ms(now)
            );
        }
    }

    let server = PaywallServer::new(gate, route, config.route_path.clone());
    let bind_addr = config.bind_addr.clone();

    tokio::select! {
        result = server.run(&bind_addr) => {
            if let Err(e) = result {
                tracing::error!("HTTP server error: {}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down...");
        }
    }

    tracing::info!("Paywall stopped");

    Ok(())
}
