//! Network collaborator - the subset of Solana RPC the engine relies on

use crate::error::NetworkError;
use async_trait::async_trait;
use solana_sdk::{hash::Hash, signature::Signature, transaction::Transaction};
use solana_transaction_status::TransactionConfirmationStatus;

/// Status of a submitted signature as reported by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStatus {
    /// Execution error, if the transaction landed and failed
    pub err: Option<String>,
    /// Commitment level reached so far
    pub confirmation_status: Option<TransactionConfirmationStatus>,
}

impl SignatureStatus {
    pub fn finalized() -> Self {
        Self {
            err: None,
            confirmation_status: Some(TransactionConfirmationStatus::Finalized),
        }
    }

    pub fn failed(err: impl Into<String>) -> Self {
        Self {
            err: Some(err.into()),
            confirmation_status: Some(TransactionConfirmationStatus::Processed),
        }
    }

    /// Irreversibly committed without error
    pub fn is_finalized_ok(&self) -> bool {
        self.err.is_none()
            && matches!(
                self.confirmation_status,
                Some(TransactionConfirmationStatus::Finalized)
            )
    }
}

/// Cluster access used by the gate.
///
/// Implementations must treat resubmission of an already-landed transaction as a
/// harmless no-op; the cluster's duplicate-signature rejection is what makes the
/// resend loop safe.
#[async_trait]
pub trait PaymentNetwork: Send + Sync {
    /// Dry-run the transaction. Any execution error is reported as `Err`.
    async fn simulate_transaction(&self, tx: &Transaction) -> Result<(), NetworkError>;

    /// Submit the transaction without server-side retries
    async fn send_transaction(
        &self,
        tx: &Transaction,
        skip_preflight: bool,
    ) -> Result<Signature, NetworkError>;

    /// One entry per requested signature; `None` when the cluster has never seen it
    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
        search_history: bool,
    ) -> Result<Vec<Option<SignatureStatus>>, NetworkError>;

    /// Recent blockhash for building new transactions (client side only)
    async fn get_latest_blockhash(&self) -> Result<Hash, NetworkError>;
}

/// Query a single signature, `None` if unknown
pub async fn signature_status(
    network: &dyn PaymentNetwork,
    signature: &Signature,
) -> Result<Option<SignatureStatus>, NetworkError> {
    let statuses = network
        .get_signature_statuses(std::slice::from_ref(signature), true)
        .await?;
    Ok(statuses.into_iter().next().flatten())
}
