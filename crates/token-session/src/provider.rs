//! The injected wallet capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::WalletError;

/// Error object returned by a wallet provider (EIP-1193 `ProviderRpcError`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderError {
    pub code: i64,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ProviderError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach an RPC-layer message under `data.message`.
    pub fn with_data_message(mut self, message: impl Into<String>) -> Self {
        self.data = Some(serde_json::json!({ "message": message.into() }));
        self
    }

    /// The nested `data.message` field, if the provider supplied one.
    pub fn data_message(&self) -> Option<String> {
        self.data
            .as_ref()?
            .get("message")?
            .as_str()
            .map(str::to_string)
    }

    /// Classify into a [`WalletError`]; `rejection_code` identifies a declined prompt.
    pub fn classify(self, rejection_code: i64) -> WalletError {
        if self.code == rejection_code {
            return WalletError::Rejected;
        }
        let data_message = self.data_message();
        WalletError::RpcFailure {
            code: self.code,
            message: self.message,
            data_message,
        }
    }
}

/// Wallet capability injected into the session: request/response RPC, the
/// network id property and the `accountsChanged` event stream.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Issue an EIP-1193 request.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// The `networkVersion` property: decimal network id, if known.
    fn network_version(&self) -> Option<String>;

    /// Subscribe to `accountsChanged` notifications. Each event carries the
    /// wallet's new account list (empty when the wallet disconnected).
    fn subscribe_accounts(&self) -> broadcast::Receiver<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_rejection() {
        let err = ProviderError::new(4001, "User denied transaction signature.");
        assert_eq!(err.classify(4001), WalletError::Rejected);
    }

    #[test]
    fn test_classify_rpc_failure_with_data() {
        let err = ProviderError::new(-32603, "Internal JSON-RPC error.")
            .with_data_message("Error: VM Exception while processing transaction");
        match err.classify(4001) {
            WalletError::RpcFailure {
                code,
                data_message,
                ..
            } => {
                assert_eq!(code, -32603);
                assert_eq!(
                    data_message.as_deref(),
                    Some("Error: VM Exception while processing transaction")
                );
            }
            other => panic!("expected RpcFailure, got {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_provider_error() {
        let err: ProviderError = serde_json::from_str(
            r#"{ "code": -32000, "message": "nonce too low", "data": { "message": "nonce too low: next nonce 4" } }"#,
        )
        .unwrap();
        assert_eq!(err.data_message().as_deref(), Some("nonce too low: next nonce 4"));
    }
}
