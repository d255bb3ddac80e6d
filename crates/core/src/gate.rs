//! Payment Gate - the per-request payment protocol
//!
//! Flow for one request:
//! 1. No artifact: quote the route (402)
//! 2. Verify the artifact against the route (400 on failure)
//! 3. Without a ledger: broadcast and map the result
//! 4. With a ledger: resume or reject an existing attempt, short-circuit on a
//!    settled duplicate intent, otherwise record the attempt and broadcast
//!
//! Each ledger call is independent; nothing here is atomic across steps. Two
//! distinct transactions for the same intent arriving together can both pass
//! the duplicate-intent check and both be broadcast.

use crate::{
    broadcast::{broadcast_with_retry, BroadcastOutcome},
    error::LedgerError,
    ledger::Ledger,
    network::{signature_status, PaymentNetwork},
    types::{unix_millis, DecodedTransfer, Outcome, PaymentRecord, PaymentResult, Route},
    verify::verify_payment,
    DEFAULT_PENDING_TIMEOUT_MS, DEFAULT_RESEND_INTERVAL_MS, PAYMENT_HEADER,
};
use serde_json::json;
use solana_sdk::signature::Signature;
use std::{sync::Arc, time::Duration};

/// State of a stored attempt after consulting its age and the network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    /// Younger than the pending window; left alone
    Pending,
    /// Finalized on chain; row removed
    Settled,
    /// Expired and not finalized; row removed
    Abandoned,
}

/// Payment gate shared by all protected routes of a server
pub struct PaymentGate {
    network: Arc<dyn PaymentNetwork>,
    ledger: Option<Arc<dyn Ledger>>,
    pending_timeout: Duration,
    resend_interval: Duration,
    confirm_timeout: Option<Duration>,
}

impl PaymentGate {
    /// Create a gate without a ledger (no idempotency)
    pub fn new(network: Arc<dyn PaymentNetwork>) -> Self {
        Self {
            network,
            ledger: None,
            pending_timeout: Duration::from_millis(DEFAULT_PENDING_TIMEOUT_MS),
            resend_interval: Duration::from_millis(DEFAULT_RESEND_INTERVAL_MS),
            confirm_timeout: None,
        }
    }

    /// Track in-flight attempts in `ledger`
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Age after which a pending attempt is re-checked against the network
    pub fn with_pending_timeout(mut self, timeout: Duration) -> Self {
        self.pending_timeout = timeout;
        self
    }

    /// Delay between resends while confirming
    pub fn with_resend_interval(mut self, interval: Duration) -> Self {
        self.resend_interval = interval;
        self
    }

    /// Broadcast deadline (defaults to the pending timeout)
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = Some(timeout);
        self
    }

    pub fn network(&self) -> &Arc<dyn PaymentNetwork> {
        &self.network
    }

    pub fn ledger(&self) -> Option<&Arc<dyn Ledger>> {
        self.ledger.as_ref()
    }

    pub fn pending_timeout(&self) -> Duration {
        self.pending_timeout
    }

    pub fn confirm_timeout(&self) -> Duration {
        self.confirm_timeout.unwrap_or(self.pending_timeout)
    }

    /// Pending rows left over from a previous run (empty without a ledger).
    ///
    /// The hosting process calls this at startup and logs the result.
    pub async fn pending_report(&self) -> Result<Vec<PaymentRecord>, LedgerError> {
        match &self.ledger {
            Some(ledger) => ledger.get_all_pending().await,
            None => Ok(Vec::new()),
        }
    }

    /// Run the payment protocol for one request.
    ///
    /// `payment_header` is the raw `x-payment` value; `route_path` identifies
    /// the endpoint for duplicate-intent detection. `Err` only when the ledger
    /// backend fails.
    ///
    /// When a different transaction for the same payer, payee, mint and route
    /// has already settled, the request proceeds with `already_settled` set and
    /// the `PaymentResult` carries that settled transaction's signature, not the
    /// one in `payment_header`. The submitted transaction is never broadcast.
    pub async fn process(
        &self,
        route: &Route,
        payment_header: Option<&str>,
        route_path: &str,
    ) -> Result<Outcome, LedgerError> {
        let artifact = match payment_header.map(str::trim) {
            Some(header) if !header.is_empty() => header,
            _ => return Ok(payment_required(route)),
        };

        let transfer = match verify_payment(artifact, route) {
            Ok(transfer) => transfer,
            Err(e) => {
                tracing::debug!("Rejected payment for {}: {}", route_path, e);
                return Ok(Outcome::respond(
                    400,
                    json!({ "error": "Invalid payment transaction" }),
                ));
            }
        };

        match &self.ledger {
            None => Ok(self.settle_without_ledger(route, artifact, &transfer).await),
            Some(ledger) => {
                self.settle_with_ledger(ledger.as_ref(), route, artifact, &transfer, route_path)
                    .await
            }
        }
    }

    async fn settle_without_ledger(
        &self,
        route: &Route,
        artifact: &str,
        transfer: &DecodedTransfer,
    ) -> Outcome {
        let signature = *transfer.signature();

        match self.broadcast(artifact).await {
            BroadcastOutcome::Confirmed(sig) => {
                Outcome::Proceed(payment_result(route, transfer, sig, false))
            }
            BroadcastOutcome::Timeout(_) => Outcome::respond(
                202,
                json!({ "status": "pending", "signature": signature.to_string() }),
            ),
            BroadcastOutcome::FinalError(_) => payment_failed(&signature),
        }
    }

    async fn settle_with_ledger(
        &self,
        ledger: &dyn Ledger,
        route: &Route,
        artifact: &str,
        transfer: &DecodedTransfer,
        route_path: &str,
    ) -> Result<Outcome, LedgerError> {
        let signature = *transfer.signature();

        if let Some(existing) = ledger.get(&signature).await? {
            match self.resolve_attempt(ledger, &existing).await? {
                AttemptState::Pending => {
                    return Ok(Outcome::respond(
                        400,
                        json!({ "error": "Payment transaction is already pending" }),
                    ));
                }
                AttemptState::Settled => {
                    return Ok(Outcome::Proceed(payment_result(
                        route, transfer, signature, true,
                    )));
                }
                AttemptState::Abandoned => {
                    tracing::info!("Re-broadcasting expired attempt {}", signature);
                }
            }
        }

        // duplicate-intent guard: another transaction for the same payment may already have landed
        let siblings = ledger
            .get_by_intent(transfer.from(), transfer.to(), transfer.mint(), route_path)
            .await?;

        for sibling in siblings.iter().filter(|r| r.signature != signature) {
            if self.resolve_attempt(ledger, sibling).await? == AttemptState::Settled {
                tracing::info!(
                    "Payment for {} already settled by {}, skipping broadcast of {}",
                    route_path,
                    sibling.signature,
                    signature
                );
                return Ok(Outcome::Proceed(payment_result(
                    route,
                    transfer,
                    sibling.signature,
                    true,
                )));
            }
        }

        ledger.insert_pending(&transfer.pending(route_path)).await?;

        match self.broadcast(artifact).await {
            BroadcastOutcome::Confirmed(sig) => {
                ledger.remove(&signature).await?;
                Ok(Outcome::Proceed(payment_result(route, transfer, sig, false)))
            }
            BroadcastOutcome::Timeout(_) => {
                // row kept: a retry with the same signature resumes from it
                Ok(Outcome::respond(
                    202,
                    json!({
                        "status": "pending",
                        "signature": signature.to_string(),
                        "message": "Payment transaction is still pending, try again with same signature.",
                    }),
                ))
            }
            BroadcastOutcome::FinalError(_) => {
                ledger.remove(&signature).await?;
                Ok(payment_failed(&signature))
            }
        }
    }

    /// Classify a stored attempt, removing it once it is no longer pending
    async fn resolve_attempt(
        &self,
        ledger: &dyn Ledger,
        record: &PaymentRecord,
    ) -> Result<AttemptState, LedgerError> {
        let window = i64::try_from(self.pending_timeout.as_millis()).unwrap_or(i64::MAX);
        if record.age_ms(unix_millis()) < window {
            return Ok(AttemptState::Pending);
        }

        let finalized = match signature_status(self.network.as_ref(), &record.signature).await {
            Ok(status) => status.is_some_and(|s| s.is_finalized_ok()),
            Err(e) => {
                tracing::warn!("Status check for {} failed: {}", record.signature, e);
                false
            }
        };

        ledger.remove(&record.signature).await?;

        Ok(if finalized {
            AttemptState::Settled
        } else {
            AttemptState::Abandoned
        })
    }

    async fn broadcast(&self, artifact: &str) -> BroadcastOutcome {
        broadcast_with_retry(
            self.network.as_ref(),
            artifact,
            self.confirm_timeout(),
            self.resend_interval,
        )
        .await
    }
}

fn payment_required(route: &Route) -> Outcome {
    Outcome::respond(
        402,
        json!({
            "error": "payment_required",
            "payment": route.quote(),
            "instructions": {
                "header": PAYMENT_HEADER,
                "description": "Retry this request with a base58-encoded signed transaction paying the above amount",
            },
        }),
    )
}

fn payment_failed(signature: &Signature) -> Outcome {
    Outcome::respond(
        500,
        json!({
            "error": "Payment transaction failed",
            "signature": signature.to_string(),
        }),
    )
}

fn payment_result(
    route: &Route,
    transfer: &DecodedTransfer,
    signature: Signature,
    already_settled: bool,
) -> PaymentResult {
    PaymentResult {
        signature,
        signer: *transfer.signer(),
        destination: route.destination,
        amount: route.amount,
        mint: route.mint,
        already_settled,
    }
}
