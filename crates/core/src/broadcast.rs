//! Broadcast-Confirm Engine
//!
//! Simulates once, submits, then polls the signature status and re-sends until
//! the transaction is finalized, fails, or the deadline passes. Re-sending a
//! landed transaction is rejected by the cluster as a duplicate, so the loop
//! cannot double-spend.

use crate::{
    network::{signature_status, PaymentNetwork},
    verify::{decode_artifact, primary_signature},
};
use solana_sdk::signature::Signature;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Submission errors that mean re-sending is pointless
const ALREADY_PROCESSED_MARKERS: [&str; 3] = [
    "already processed",
    "recently finalized",
    "transaction precompile verification failure",
];

/// Resolution of one broadcast attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Finalized without error
    Confirmed(Signature),
    /// Not resolved before the deadline; may still land
    Timeout(Signature),
    /// Will never succeed (unsigned, simulation rejected, landed with error)
    FinalError(Option<Signature>),
}

impl BroadcastOutcome {
    pub fn signature(&self) -> Option<&Signature> {
        match self {
            Self::Confirmed(sig) | Self::Timeout(sig) => Some(sig),
            Self::FinalError(sig) => sig.as_ref(),
        }
    }
}

/// Whether a submission error means the cluster already has this transaction
pub fn is_already_processed(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ALREADY_PROCESSED_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Broadcast a signed artifact and wait for finalization.
///
/// There is no cancellation: the loop ends only on resolution or when `timeout`
/// has elapsed.
pub async fn broadcast_with_retry(
    network: &dyn PaymentNetwork,
    artifact: &str,
    timeout: Duration,
    resend_every: Duration,
) -> BroadcastOutcome {
    let start = Instant::now();

    let tx = match decode_artifact(artifact) {
        Ok(tx) => tx,
        Err(e) => {
            tracing::warn!("Refusing to broadcast undecodable artifact: {}", e);
            return BroadcastOutcome::FinalError(None);
        }
    };

    let signature = match primary_signature(&tx) {
        Ok(sig) => sig,
        Err(_) => return BroadcastOutcome::FinalError(None),
    };

    if let Err(e) = network.simulate_transaction(&tx).await {
        tracing::info!("Simulation rejected {}: {}", signature, e);
        return BroadcastOutcome::FinalError(Some(signature));
    }

    // preflight already done by the simulation above
    let mut last_send_error = network
        .send_transaction(&tx, true)
        .await
        .err()
        .map(|e| e.to_string());

    let mut attempts = 1u32;

    while start.elapsed() < timeout {
        match signature_status(network, &signature).await {
            Ok(Some(status)) => {
                if let Some(err) = &status.err {
                    tracing::info!("Transaction {} landed with error: {}", signature, err);
                    return BroadcastOutcome::FinalError(Some(signature));
                }
                if status.is_finalized_ok() {
                    tracing::debug!("Transaction {} finalized after {} sends", signature, attempts);
                    return BroadcastOutcome::Confirmed(signature);
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!("Status query for {} failed: {}", signature, e);
            }
        }

        let already_processed = last_send_error
            .as_deref()
            .is_some_and(is_already_processed);

        if !already_processed {
            last_send_error = network
                .send_transaction(&tx, true)
                .await
                .err()
                .map(|e| e.to_string());
            attempts += 1;
        }

        sleep(resend_every).await;
    }

    tracing::debug!(
        "Transaction {} unresolved after {:?} ({} sends)",
        signature,
        timeout,
        attempts
    );
    BroadcastOutcome::Timeout(signature)
}
