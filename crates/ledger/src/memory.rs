//! In-memory ledger using DashMap for concurrent access

use async_trait::async_trait;
use dashmap::DashMap;
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::sync::Arc;
use z402_core::{
    types::unix_millis, Ledger, LedgerError, PaymentRecord, PendingPayment,
};

/// Thread-safe in-memory ledger.
///
/// Rows are lost on restart; use `SledLedger` when pending attempts must
/// survive the process.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    records: Arc<DashMap<Signature, PaymentRecord>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn insert_pending(&self, payment: &PendingPayment) -> Result<(), LedgerError> {
        // entry() holds the shard lock, so concurrent inserts of one signature keep the first row
        self.records
            .entry(payment.signature)
            .or_insert_with(|| PaymentRecord::from_pending(payment, unix_millis()));
        Ok(())
    }

    async fn remove(&self, signature: &Signature) -> Result<(), LedgerError> {
        self.records.remove(signature);
        Ok(())
    }

    async fn get(&self, signature: &Signature) -> Result<Option<PaymentRecord>, LedgerError> {
        Ok(self.records.get(signature).map(|r| r.value().clone()))
    }

    async fn get_by_intent(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        mint: Option<&Pubkey>,
        route: &str,
    ) -> Result<Vec<PaymentRecord>, LedgerError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.value().matches_intent(from, to, mint, route))
            .map(|r| r.value().clone())
            .collect())
    }

    async fn get_all_pending(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use z402_core::PaymentStatus;

    fn pending(route: &str) -> PendingPayment {
        PendingPayment {
            signature: Signature::new_unique(),
            from: Pubkey::new_unique(),
            to: Pubkey::new_unique(),
            amount: 1_000,
            mint: None,
            route: route.to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let ledger = MemoryLedger::new();
        let payment = pending("/paid");

        ledger.insert_pending(&payment).await.unwrap();

        let record = ledger.get(&payment.signature).await.unwrap().unwrap();
        assert_eq!(record.from, payment.from);
        assert_eq!(record.to, payment.to);
        assert_eq!(record.amount, payment.amount);
        assert_eq!(record.mint, payment.mint);
        assert_eq!(record.route, payment.route);
        assert_eq!(record.status, PaymentStatus::Pending);
    }

    #[tokio::test]
    async fn test_duplicate_insert_keeps_first_row() {
        let ledger = MemoryLedger::new();
        let payment = pending("/paid");

        ledger.insert_pending(&payment).await.unwrap();
        let first = ledger.get(&payment.signature).await.unwrap().unwrap();

        let mut again = payment.clone();
        again.route = "/elsewhere".to_string();
        ledger.insert_pending(&again).await.unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&payment.signature).await.unwrap().unwrap(), first);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_inserts_of_one_signature_keep_one_row() {
        let ledger = MemoryLedger::new();
        let payment = pending("/paid");

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                let mut attempt = payment.clone();
                attempt.route = format!("/paid?attempt={}", i);
                tokio::spawn(async move { ledger.insert_pending(&attempt).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.len(), 1);
        let winner = ledger.get(&payment.signature).await.unwrap().unwrap();

        // later duplicates leave the winning row untouched
        let (a, b) = tokio::join!(
            ledger.insert_pending(&payment),
            ledger.insert_pending(&payment)
        );
        a.unwrap();
        b.unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&payment.signature).await.unwrap().unwrap(), winner);
    }

    #[tokio::test]
    async fn test_intent_lookup_and_remove() {
        let ledger = MemoryLedger::new();
        let a = pending("/paid");
        let mut b = pending("/paid");
        b.from = a.from;
        b.to = a.to;
        let c = pending("/paid");

        for p in [&a, &b, &c] {
            ledger.insert_pending(p).await.unwrap();
        }

        let matches = ledger.get_by_intent(&a.from, &a.to, None, "/paid").await.unwrap();
        assert_eq!(matches.len(), 2);

        ledger.remove(&a.signature).await.unwrap();
        let matches = ledger.get_by_intent(&a.from, &a.to, None, "/paid").await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].signature, b.signature);

        assert_eq!(ledger.get_all_pending().await.unwrap().len(), 2);
    }
}
