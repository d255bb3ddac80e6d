//! Paywall node configuration

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc, time::Duration};
use z402_core::{
    Ledger, PaymentGate, PaymentNetwork, Route, DEFAULT_PENDING_TIMEOUT_MS,
    DEFAULT_RESEND_INTERVAL_MS,
};
use z402_ledger::{MemoryLedger, SledLedger};

/// Where pending payment rows are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// No ledger: every request is broadcast, no resume after timeout
    None,
    /// Process-local map, lost on restart
    Memory,
    /// sled database under the data directory
    Sled,
}

/// Paywall node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Solana JSON-RPC endpoint
    pub rpc_url: String,
    /// HTTP bind address
    pub bind_addr: String,
    /// Path of the protected route
    pub route_path: String,
    /// Payee wallet (base58)
    pub destination: String,
    /// Price in base units
    pub amount: String,
    /// SPL mint (base58); native SOL when absent
    pub mint: Option<String>,
    /// Age after which a pending row is re-checked on chain
    pub pending_timeout_ms: u64,
    /// Delay between resubmissions while waiting for finalization
    pub resend_interval_ms: u64,
    /// Broadcast deadline; falls back to the pending timeout
    pub confirm_timeout_ms: Option<u64>,
    /// Ledger backend
    pub ledger: LedgerBackend,
    /// Data directory for the sled backend
    pub data_dir: PathBuf,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.devnet.solana.com".to_string(),
            bind_addr: "127.0.0.1:3402".to_string(),
            route_path: "/paid".to_string(),
            destination: String::new(),
            amount: "1000000".to_string(),
            mint: None,
            pending_timeout_ms: DEFAULT_PENDING_TIMEOUT_MS,
            resend_interval_ms: DEFAULT_RESEND_INTERVAL_MS,
            confirm_timeout_ms: None,
            ledger: LedgerBackend::Memory,
            data_dir: PathBuf::from("./data"),
        }
    }
}

impl GateConfig {
    /// Parse the declared route
    pub fn route(&self) -> Result<Route> {
        Route::parse(&self.destination, &self.amount, self.mint.as_deref())
            .context("invalid route declaration")
    }

    /// Open the configured ledger backend
    pub fn open_ledger(&self) -> Result<Option<Arc<dyn Ledger>>> {
        let ledger: Arc<dyn Ledger> = match self.ledger {
            LedgerBackend::None => return Ok(None),
            LedgerBackend::Memory => Arc::new(MemoryLedger::new()),
            LedgerBackend::Sled => {
                std::fs::create_dir_all(&self.data_dir)?;
                Arc::new(SledLedger::open(self.data_dir.join("ledger"))?)
            }
        };
        Ok(Some(ledger))
    }

    /// Assemble a gate over `network` with this configuration's timings and ledger
    pub fn build_gate(&self, network: Arc<dyn PaymentNetwork>) -> Result<PaymentGate> {
        let mut gate = PaymentGate::new(network)
            .with_pending_timeout(Duration::from_millis(self.pending_timeout_ms))
            .with_resend_interval(Duration::from_millis(self.resend_interval_ms));

        if let Some(ms) = self.confirm_timeout_ms {
            gate = gate.with_confirm_timeout(Duration::from_millis(ms));
        }
        if let Some(ledger) = self.open_ledger()? {
            gate = gate.with_ledger(ledger);
        }

        Ok(gate)
    }
}
