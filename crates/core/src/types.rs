//! Shared data contracts between the verifier, orchestrator and ledger

use crate::error::RouteError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use solana_sdk::{pubkey::Pubkey, signature::Signature};
use std::str::FromStr;

/// SPL Token program
pub const TOKEN_PROGRAM_ID: Pubkey = solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");

/// SPL Token-2022 program
pub const TOKEN_2022_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb");

/// SPL Associated Token Account program
pub const ASSOCIATED_TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// Derive the associated token account holding `owner`'s balance of `mint`
pub fn derive_associated_token_address(
    owner: &Pubkey,
    mint: &Pubkey,
    token_program: &Pubkey,
) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), token_program.as_ref(), mint.as_ref()],
        &ASSOCIATED_TOKEN_PROGRAM_ID,
    )
    .0
}

/// Current wall-clock time in unix milliseconds
pub fn unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A server-declared payment requirement guarding one endpoint.
///
/// `mint == None` means the route is paid in lamports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Receiving wallet (for tokens, the owner of the destination ATA)
    pub destination: Pubkey,
    /// Lamports or raw token units
    pub amount: u64,
    /// Token mint for SPL routes
    pub mint: Option<Pubkey>,
}

impl Route {
    /// Route paid in lamports
    pub fn native(destination: Pubkey, amount: u64) -> Self {
        Self {
            destination,
            amount,
            mint: None,
        }
    }

    /// Route paid in raw units of an SPL mint
    pub fn token(destination: Pubkey, amount: u64, mint: Pubkey) -> Self {
        Self {
            destination,
            amount,
            mint: Some(mint),
        }
    }

    /// Build a route from its textual form (base58 keys, decimal amount)
    pub fn parse(destination: &str, amount: &str, mint: Option<&str>) -> Result<Self, RouteError> {
        let destination = Pubkey::from_str(destination)
            .map_err(|_| RouteError::InvalidDestination(destination.to_string()))?;
        let amount = amount
            .trim()
            .parse::<u64>()
            .map_err(|_| RouteError::InvalidAmount(amount.to_string()))?;
        let mint = mint
            .map(|m| Pubkey::from_str(m).map_err(|_| RouteError::InvalidMint(m.to_string())))
            .transpose()?;

        Ok(Self {
            destination,
            amount,
            mint,
        })
    }

    /// Payment quote echoed to clients in the 402 body
    pub fn quote(&self) -> Value {
        json!({
            "destination": self.destination.to_string(),
            "amount": self.amount.to_string(),
            "mint": self.mint.map(|m| m.to_string()),
        })
    }
}

/// A transfer extracted from an artifact that passed verification against a route.
///
/// Only the verifier constructs these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    signature: Signature,
    from: Pubkey,
    to: Pubkey,
    amount: u64,
    mint: Option<Pubkey>,
    signer: Pubkey,
}

impl DecodedTransfer {
    pub(crate) fn new(
        signature: Signature,
        from: Pubkey,
        to: Pubkey,
        amount: u64,
        mint: Option<Pubkey>,
        signer: Pubkey,
    ) -> Self {
        Self {
            signature,
            from,
            to,
            amount,
            mint,
            signer,
        }
    }

    /// Primary (fee payer) signature, the idempotency key
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Native: paying wallet. Token: source token account.
    pub fn from(&self) -> &Pubkey {
        &self.from
    }

    /// Receiving wallet (the owner, never the derived token account)
    pub fn to(&self) -> &Pubkey {
        &self.to
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn mint(&self) -> Option<&Pubkey> {
        self.mint.as_ref()
    }

    /// Fee payer of the transaction
    pub fn signer(&self) -> &Pubkey {
        &self.signer
    }

    /// Ledger row describing this transfer as an in-flight attempt on `route`
    pub fn pending(&self, route: &str) -> PendingPayment {
        PendingPayment {
            signature: self.signature,
            from: self.from,
            to: self.to,
            amount: self.amount,
            mint: self.mint,
            route: route.to_string(),
        }
    }
}

/// Ledger row status. Only in-flight attempts are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentStatus {
    Pending,
}

/// Insert request for a ledger backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPayment {
    pub signature: Signature,
    pub from: Pubkey,
    pub to: Pubkey,
    pub amount: u64,
    pub mint: Option<Pubkey>,
    pub route: String,
}

/// A stored in-flight payment attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub signature: Signature,
    pub from: Pubkey,
    pub to: Pubkey,
    pub amount: u64,
    pub mint: Option<Pubkey>,
    /// Logical endpoint identity (path + query)
    pub route: String,
    pub status: PaymentStatus,
    /// Insertion time, unix milliseconds
    pub created_at: i64,
}

impl PaymentRecord {
    /// Materialize an insert request as a pending row created at `created_at`
    pub fn from_pending(payment: &PendingPayment, created_at: i64) -> Self {
        Self {
            signature: payment.signature,
            from: payment.from,
            to: payment.to,
            amount: payment.amount,
            mint: payment.mint,
            route: payment.route.clone(),
            status: PaymentStatus::Pending,
            created_at,
        }
    }

    /// Milliseconds since insertion
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_at)
    }

    /// Whether this row describes the same logical payment
    pub fn matches_intent(
        &self,
        from: &Pubkey,
        to: &Pubkey,
        mint: Option<&Pubkey>,
        route: &str,
    ) -> bool {
        self.from == *from && self.to == *to && self.mint.as_ref() == mint && self.route == route
    }
}

/// Payment details handed to the protected handler once the gate lets a request through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    #[serde(serialize_with = "as_string::serialize")]
    pub signature: Signature,
    #[serde(serialize_with = "as_string::serialize")]
    pub signer: Pubkey,
    #[serde(serialize_with = "as_string::serialize")]
    pub destination: Pubkey,
    #[serde(serialize_with = "as_string::serialize")]
    pub amount: u64,
    #[serde(serialize_with = "as_string::serialize_option")]
    pub mint: Option<Pubkey>,
    /// True when a prior finalization was found and nothing was broadcast
    pub already_settled: bool,
}

/// Decision produced by the gate for one request
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Short-circuit with this HTTP status and JSON body
    Respond { status: u16, body: Value },
    /// Let the request through
    Proceed(PaymentResult),
}

impl Outcome {
    pub fn respond(status: u16, body: Value) -> Self {
        Self::Respond { status, body }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Respond { status, .. } => Some(*status),
            Self::Proceed(_) => None,
        }
    }
}

mod as_string {
    use serde::Serializer;
    use std::fmt::Display;

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn serialize_option<T: Display, S: Serializer>(
        value: &Option<T>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }
}
