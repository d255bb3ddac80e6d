//! z402 Core - Payment verification and settlement engine
//!
//! Gates an endpoint behind a Solana micropayment:
//! - Verifies a client-signed transfer against a declared route
//! - Tracks in-flight attempts in a pluggable ledger (idempotency + replay guard)
//! - Broadcasts and confirms the transfer under a deadline

pub mod broadcast;
pub mod error;
pub mod gate;
pub mod ledger;
pub mod network;
pub mod transfer;
pub mod types;
pub mod verify;

#[cfg(test)]
mod tests;

pub use broadcast::{broadcast_with_retry, BroadcastOutcome};
pub use error::{LedgerError, NetworkError, RouteError, VerifyError};
pub use gate::PaymentGate;
pub use ledger::Ledger;
pub use network::{PaymentNetwork, SignatureStatus};
pub use transfer::{PaymentTransactionBuilder, PriorityFee};
pub use types::{
    DecodedTransfer, Outcome, PaymentRecord, PaymentResult, PaymentStatus, PendingPayment, Route,
};
pub use verify::verify_payment;

/// Request header carrying the base58 signed payment transaction
pub const PAYMENT_HEADER: &str = "x-payment";

/// Age after which a pending record is re-checked against the network (ms)
pub const DEFAULT_PENDING_TIMEOUT_MS: u64 = 60_000;

/// Interval between resend attempts while confirming (ms)
pub const DEFAULT_RESEND_INTERVAL_MS: u64 = 600;
