use thiserror::Error;

use crate::address::TxHash;

/// Unified error type for the token session library.
#[derive(Debug, Error)]
pub enum Error {
    #[error("binding error: {0}")]
    Binding(#[from] BindingError),

    #[error("wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("no account connected")]
    NotConnected,

    #[error("a transfer is already in flight")]
    TransferInFlight,
}

/// Errors while encoding calls or decoding return data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("invalid function signature: {0}")]
    InvalidSignature(String),

    #[error("data too short: expected at least {expected} bytes, got {actual}")]
    DataTooShort { expected: usize, actual: usize },

    #[error("selector mismatch: expected {expected}, got {actual}")]
    SelectorMismatch { expected: String, actual: String },

    #[error("invalid ABI encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported type: {0}")]
    UnsupportedType(String),

    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),
}

/// Errors while building the contract binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("no deployment found for contract {contract}")]
    NotFound { contract: String },

    #[error("function missing from contract ABI: {0}")]
    MissingFunction(String),

    #[error("invalid hex value: {0}")]
    InvalidHex(String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// A wallet or chain failure, classified once at the point the external error
/// is received.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WalletError {
    #[error("no wallet provider detected")]
    ProviderMissing,

    #[error("request rejected by user")]
    Rejected,

    #[error("rpc failure ({code}): {message}")]
    RpcFailure {
        code: i64,
        message: String,
        /// Inner RPC-layer message (`error.data.message`), when the wallet supplied one.
        data_message: Option<String>,
    },

    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("malformed wallet response: {0}")]
    InvalidResponse(String),
}

impl WalletError {
    /// Whether this is the user declining a wallet prompt.
    pub fn is_rejection(&self) -> bool {
        matches!(self, WalletError::Rejected)
    }

    /// Message for display, preferring the inner RPC message over the outer one.
    pub fn display_message(&self) -> String {
        match self {
            WalletError::RpcFailure {
                data_message: Some(inner),
                ..
            } => inner.clone(),
            WalletError::RpcFailure { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_message_prefers_inner() {
        let err = WalletError::RpcFailure {
            code: -32603,
            message: "Internal JSON-RPC error.".to_string(),
            data_message: Some("reverted with reason string 'Not enough tokens'".to_string()),
        };
        assert_eq!(
            err.display_message(),
            "reverted with reason string 'Not enough tokens'"
        );
    }

    #[test]
    fn test_display_message_falls_back_to_outer() {
        let err = WalletError::RpcFailure {
            code: -32000,
            message: "header not found".to_string(),
            data_message: None,
        };
        assert_eq!(err.display_message(), "header not found");
        assert!(!err.is_rejection());
        assert!(WalletError::Rejected.is_rejection());
    }
}
