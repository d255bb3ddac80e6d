//! Persistent ledger backed by sled
//!
//! Rows are bincode-encoded `PaymentRecord`s keyed by the raw 64-byte
//! signature in a dedicated `payments` tree.

use async_trait::async_trait;
use sled::Db;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::path::Path;
use z402_core::{
    types::unix_millis, Ledger, LedgerError, PaymentRecord, PendingPayment,
};

const PAYMENTS_TREE: &str = "payments";

/// Pending-payment ledger on an embedded sled database
pub struct SledLedger {
    db: Db,
    payments: sled::Tree,
}

impl SledLedger {
    /// Open or create a ledger at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LedgerError> {
        let db = sled::open(&path).map_err(storage)?;
        let payments = db.open_tree(PAYMENTS_TREE).map_err(storage)?;

        tracing::info!("Opened payment ledger at {:?}", path.as_ref());

        Ok(Self { db, payments })
    }

    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<(), LedgerError> {
        self.db.flush().map_err(storage)?;
        Ok(())
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.payments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payments.is_empty()
    }

    fn scan<F>(&self, mut keep: F) -> Result<Vec<PaymentRecord>, LedgerError>
    where
        F: FnMut(&PaymentRecord) -> bool,
    {
        let mut records = Vec::new();

        for entry in self.payments.iter() {
            let (_, value) = entry.map_err(storage)?;
            let record = decode(&value)?;
            if keep(&record) {
                records.push(record);
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl Ledger for SledLedger {
    async fn insert_pending(&self, payment: &PendingPayment) -> Result<(), LedgerError> {
        let record = PaymentRecord::from_pending(payment, unix_millis());
        let bytes = bincode::serialize(&record)
            .map_err(|e| LedgerError::Corrupt(e.to_string()))?;

        // compare-and-swap from "absent" makes the insert atomic; losing the race is fine
        let swapped = self
            .payments
            .compare_and_swap(payment.signature.as_ref(), None::<&[u8]>, Some(bytes))
            .map_err(storage)?;

        if swapped.is_err() {
            tracing::debug!("Pending row for {} already exists", payment.signature);
        }

        Ok(())
    }

    async fn remove(&self, signature: &Signature) -> Result<(), LedgerError> {
        self.payments.remove(signature.as_ref()).map_err(storage)?;
        Ok(())
    }

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>, LedgerError> {
        match self.payments.get(signature.as_ref()).map_err(storage)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn get_by_intent(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        mint: Option<&Pubkey>,
        route: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        self.scan(|r| r.matches_intent(from, to, mint, route))
    }

    async fn get_all_pending(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
        self.scan(|_| true)
    }
}

fn storage(e: sled::Error) -> LedgerError {
    LedgerError::Storage(e.to_string())
}

fn decode(bytes: &[u8]) -> Result<PaymentRecord, LedgerError> {
    bincode::deserialize(bytes).map_err(|e| LedgerError::Corrupt(e.to_string()))
}
