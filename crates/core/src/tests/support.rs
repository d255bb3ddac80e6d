//! Test doubles for the network and ledger collaborators

use crate::{
    error::{LedgerError, NetworkError},
    ledger::Ledger,
    network::{PaymentNetwork, SignatureStatus},
    transfer::{encode_artifact, PaymentTransactionBuilder},
    types::{PaymentRecord, PendingPayment, Route},
};
use async_trait::async_trait;
use parking_lot::Mutex;
use solana_sdk::{
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
    system_instruction,
    transaction::Transaction,
};
use std::{
    collections::HashMap,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Signed single-instruction lamport transfer
pub fn native_payment(payer: &Keypair, destination: &Pubkey, lamports: u64) -> Transaction {
    let ix = system_instruction::transfer(&payer.pubkey(), destination, lamports);
    Transaction::new_signed_with_payer(&[ix], Some(&payer.pubkey()), &[payer], Hash::new_unique())
}

/// Signed SPL transfer paying `route`
pub fn token_payment(payer: &Keypair, route: &Route) -> Transaction {
    PaymentTransactionBuilder::new(*route).build(payer, Hash::new_unique())
}

pub fn encode(tx: &Transaction) -> String {
    encode_artifact(tx).unwrap()
}

/// Scriptable cluster
#[derive(Default)]
pub struct StubNetwork {
    simulation_error: Mutex<Option<String>>,
    send_error: Mutex<Option<String>>,
    confirm_on_send: AtomicBool,
    statuses: Mutex<HashMap<Signature, SignatureStatus>>,
    simulations: AtomicUsize,
    sends: AtomicUsize,
    status_queries: AtomicUsize,
}

impl StubNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalize a transaction as soon as it is successfully sent
    pub fn confirm_on_send(&self, enabled: bool) {
        self.confirm_on_send.store(enabled, Ordering::SeqCst);
    }

    pub fn fail_simulation(&self, err: &str) {
        *self.simulation_error.lock() = Some(err.to_string());
    }

    pub fn fail_sends(&self, err: &str) {
        *self.send_error.lock() = Some(err.to_string());
    }

    pub fn clear_send_error(&self) {
        *self.send_error.lock() = None;
    }

    pub fn set_status(&self, signature: Signature, status: SignatureStatus) {
        self.statuses.lock().insert(signature, status);
    }

    pub fn simulations(&self) -> usize {
        self.simulations.load(Ordering::SeqCst)
    }

    pub fn sends(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentNetwork for StubNetwork {
    async fn simulate_transaction(&self, _tx: &Transaction) -> Result<(), NetworkError> {
        self.simulations.fetch_add(1, Ordering::SeqCst);
        match self.simulation_error.lock().clone() {
            Some(err) => Err(NetworkError::Simulation(err)),
            None => Ok(()),
        }
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        _skip_preflight: bool,
    ) -> Result<Signature, NetworkError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.send_error.lock().clone() {
            return Err(NetworkError::Rpc(err));
        }

        let signature = tx.signatures[0];
        if self.confirm_on_send.load(Ordering::SeqCst) {
            self.set_status(signature, SignatureStatus::finalized());
        }
        Ok(signature)
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
        _search_history: bool,
    ) -> Result<Vec<Option<SignatureStatus>>, NetworkError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        let statuses = self.statuses.lock();
        Ok(signatures.iter().map(|s| statuses.get(s).cloned()).collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, NetworkError> {
        Ok(Hash::new_unique())
    }
}

/// In-memory ledger whose rows can be aged artificially
#[derive(Default)]
pub struct StubLedger {
    rows: Mutex<HashMap<Signature, PaymentRecord>>,
}

impl StubLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a row's creation time `ms` into the past
    pub fn age(&self, signature: &Signature, ms: i64) {
        if let Some(row) = self.rows.lock().get_mut(signature) {
            row.created_at -= ms;
        }
    }

    pub fn contains(&self, signature: &Signature) -> bool {
        self.rows.lock().contains_key(signature)
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }
}

#[async_trait]
impl Ledger for StubLedger {
    async fn insert_pending(&self, payment: &PendingPayment) -> Result<(), LedgerError> {
        self.rows
            .lock()
            .entry(payment.signature)
            .or_insert_with(|| PaymentRecord::from_pending(payment, crate::types::unix_millis()));
        Ok(())
    }

    async fn remove(&self, signature: &Signature) -> Result<(), LedgerError> {
        self.rows.lock().remove(signature);
        Ok(())
    }

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>, LedgerError> {
        Ok(self.rows.lock().get(signature).cloned())
    }

    async fn get_by_intent(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        mint: Option<&Pubkey>,
        route: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|r| r.matches_intent(from, to, mint, route))
            .cloned()
            .collect())
    }

    async fn get_all_pending(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
        Ok(self.rows.lock().values().cloned().collect())
    }
}
