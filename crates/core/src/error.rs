//! z402 Errors

use thiserror::Error;

/// Failure to decode or validate a payment artifact.
///
/// Both variants surface to the client as the same 400 response; the split only
/// matters for logs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Invalid payment artifact: {0}")]
    InvalidArtifact(String),

    #[error("Payment transaction does not satisfy route")]
    ValidationFailure,
}

/// Route declaration errors (raised at configuration time, never per request)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid mint: {0}")]
    InvalidMint(String),
}

/// Errors from the network collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("RPC transport error: {0}")]
    Transport(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Invalid RPC response: {0}")]
    InvalidResponse(String),
}

/// Errors from a ledger backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}
