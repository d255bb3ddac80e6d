//! Ledger collaborator - persistence of in-flight payment attempts
//!
//! A row exists iff the attempt is pending. Settled and failed attempts are
//! removed, never marked. Backends live in `z402-ledger`.

use crate::{
    error::LedgerError,
    types::{PaymentRecord, PendingPayment},
};
use async_trait::async_trait;
use solana_sdk::{pubkey::Pubkey, signature::Signature};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Insert a pending row. Must be atomic and a no-op when the signature exists.
    async fn insert_pending(&self, payment: &PendingPayment) -> Result<(), LedgerError>;

    /// Delete a row (no-op when absent)
    async fn remove(&self, signature: &Signature) -> Result<(), LedgerError>;

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>, LedgerError>;

    /// All pending rows for the same logical payment
    async fn get_by_intent(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        mint: Option<&Pubkey>,
        route: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError>;

    /// Every pending row (startup diagnostics)
    async fn get_all_pending(&self) -> Result<Vec<PaymentRecord>, LedgerError>;
}
