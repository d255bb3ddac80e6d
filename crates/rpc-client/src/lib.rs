//! z402 RPC - Solana JSON-RPC implementation of the network collaborator
//!
//! Methods used:
//! - simulateTransaction
//! - sendTransaction (base64, skipPreflight, maxRetries = 0)
//! - getSignatureStatuses (searchTransactionHistory)
//! - getLatestBlockhash

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use jsonrpsee::{
    core::{client::ClientT, ClientError},
    http_client::{HttpClient, HttpClientBuilder},
    rpc_params,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use solana_sdk::{hash::Hash, signature::Signature, transaction::Transaction};
use solana_transaction_status::TransactionConfirmationStatus;
use std::{str::FromStr, time::Duration};
use z402_core::{NetworkError, PaymentNetwork, SignatureStatus};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Commitment used for simulation and blockhash queries
const COMMITMENT: &str = "confirmed";

// ============ Response Types ============

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct RpcSimulateValue {
    err: Option<Value>,
    #[serde(default)]
    logs: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcSignatureStatus {
    err: Option<Value>,
    confirmation_status: Option<TransactionConfirmationStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlockhash {
    blockhash: String,
}

impl From<RpcSignatureStatus> for SignatureStatus {
    fn from(status: RpcSignatureStatus) -> Self {
        Self {
            err: status.err.filter(|e| !e.is_null()).map(|e| e.to_string()),
            confirmation_status: status.confirmation_status,
        }
    }
}

// ============ Client ============

/// Network collaborator talking to a Solana RPC node over HTTP
pub struct RpcNetwork {
    client: HttpClient,
    url: String,
}

impl RpcNetwork {
    /// Connect to an RPC endpoint with the default request timeout
    pub fn new(url: &str) -> Result<Self, NetworkError> {
        Self::with_timeout(url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(url: &str, timeout: Duration) -> Result<Self, NetworkError> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(map_client_error)?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    /// Get the RPC URL
    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: jsonrpsee::core::params::ArrayParams,
    ) -> Result<T, NetworkError> {
        self.client
            .request::<T, _>(method, params)
            .await
            .map_err(map_client_error)
    }
}

#[async_trait]
impl PaymentNetwork for RpcNetwork {
    async fn simulate_transaction(&self, tx: &Transaction) -> Result<(), NetworkError> {
        let response: RpcResponse<RpcSimulateValue> = self
            .call(
                "simulateTransaction",
                rpc_params![
                    encode_transaction(tx)?,
                    json!({ "encoding": "base64", "commitment": COMMITMENT })
                ],
            )
            .await?;

        match response.value.err.filter(|e| !e.is_null()) {
            Some(err) => {
                if let Some(logs) = &response.value.logs {
                    tracing::debug!("Simulation logs: {:?}", logs);
                }
                Err(NetworkError::Simulation(err.to_string()))
            }
            None => Ok(()),
        }
    }

    async fn send_transaction(
        &self,
        tx: &Transaction,
        skip_preflight: bool,
    ) -> Result<Signature, NetworkError> {
        let signature: String = self
            .call(
                "sendTransaction",
                rpc_params![
                    encode_transaction(tx)?,
                    json!({
                        "encoding": "base64",
                        "skipPreflight": skip_preflight,
                        "maxRetries": 0,
                    })
                ],
            )
            .await?;

        Signature::from_str(&signature)
            .map_err(|_| NetworkError::InvalidResponse(format!("bad signature {}", signature)))
    }

    async fn get_signature_statuses(
        &self,
        signatures: &[Signature],
        search_history: bool,
    ) -> Result<Vec<Option<SignatureStatus>>, NetworkError> {
        let keys: Vec<String> = signatures.iter().map(|s| s.to_string()).collect();

        let response: RpcResponse<Vec<Option<RpcSignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                rpc_params![keys, json!({ "searchTransactionHistory": search_history })],
            )
            .await?;

        if response.value.len() != signatures.len() {
            return Err(NetworkError::InvalidResponse(format!(
                "expected {} statuses, got {}",
                signatures.len(),
                response.value.len()
            )));
        }

        Ok(response
            .value
            .into_iter()
            .map(|s| s.map(SignatureStatus::from))
            .collect())
    }

    async fn get_latest_blockhash(&self) -> Result<Hash, NetworkError> {
        let response: RpcResponse<RpcBlockhash> = self
            .call(
                "getLatestBlockhash",
                rpc_params![json!({ "commitment": COMMITMENT })],
            )
            .await?;

        Hash::from_str(&response.value.blockhash).map_err(|_| {
            NetworkError::InvalidResponse(format!("bad blockhash {}", response.value.blockhash))
        })
    }
}

/// Base64 wire encoding expected by the RPC
fn encode_transaction(tx: &Transaction) -> Result<String, NetworkError> {
    let bytes = bincode::serialize(tx)
        .map_err(|e| NetworkError::InvalidResponse(format!("cannot serialize transaction: {}", e)))?;
    Ok(BASE64.encode(bytes))
}

fn map_client_error(e: ClientError) -> NetworkError {
    match e {
        ClientError::Call(err) => NetworkError::Rpc(err.message().to_string()),
        ClientError::ParseError(err) => NetworkError::InvalidResponse(err.to_string()),
        other => NetworkError::Transport(other.to_string()),
    }
}
