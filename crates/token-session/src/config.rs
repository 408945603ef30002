use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Chain id of the local development network.
pub const LOCAL_DEV_CHAIN_ID: u64 = 31337;

/// EIP-1193 code for a request the user declined.
pub const USER_REJECTED_CODE: i64 = 4001;

/// Fixed decimals of the token amounts.
pub const TOKEN_DECIMALS: u8 = 18;

/// Session settings. Every field has a default, so a JSON override may name
/// only the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Network the wallet must be on.
    pub required_chain_id: u64,

    /// Period of the balance / total-supply poll.
    pub poll_interval_ms: u64,

    /// Period between receipt lookups while a transfer awaits confirmation.
    pub receipt_poll_interval_ms: u64,

    /// Provider error code meaning "user rejected".
    pub rejection_code: i64,

    pub decimals: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            required_chain_id: LOCAL_DEV_CHAIN_ID,
            poll_interval_ms: 1000,
            receipt_poll_interval_ms: 1000,
            rejection_code: USER_REJECTED_CODE,
            decimals: TOKEN_DECIMALS,
        }
    }
}

impl SessionConfig {
    /// Parse and validate a config from JSON.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("pollIntervalMs must be positive".to_string()));
        }
        if self.receipt_poll_interval_ms == 0 {
            return Err(Error::Config(
                "receiptPollIntervalMs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms.max(1))
    }
}

/// Chain id in the `0x`-hex form used by `wallet_switchEthereumChain`.
pub fn chain_id_hex(chain_id: u64) -> String {
    format!("0x{chain_id:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.required_chain_id, 31337);
        assert_eq!(chain_id_hex(config.required_chain_id), "0x7a69");
        assert_eq!(config.poll_interval(), Duration::from_millis(1000));
        assert_eq!(config.rejection_code, 4001);
        assert_eq!(config.decimals, 18);
    }

    #[test]
    fn test_partial_override() {
        let config = SessionConfig::from_json(r#"{ "requiredChainId": 1, "pollIntervalMs": 250 }"#).unwrap();
        assert_eq!(config.required_chain_id, 1);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.rejection_code, USER_REJECTED_CODE);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = SessionConfig::from_json(r#"{ "pollIntervalMs": 0 }"#);
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
