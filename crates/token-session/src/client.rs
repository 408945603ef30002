use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use crate::abi::AbiValue;
use crate::address::{Address, TxHash};
use crate::binding::{ContractFunction, TokenBinding};
use crate::config::{chain_id_hex, SessionConfig};
use crate::error::WalletError;
use crate::provider::WalletProvider;
use crate::token::Amount;

/// Terminal status of an included transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// Typed adapter over the wallet capability and the token binding.
///
/// Every provider error is classified into a [`WalletError`] here, so callers
/// never see the raw provider error shape.
#[derive(Clone)]
pub struct ChainClient {
    provider: Arc<dyn WalletProvider>,
    token: TokenBinding,
    rejection_code: i64,
    receipt_poll_interval: Duration,
}

impl ChainClient {
    pub fn new(provider: Arc<dyn WalletProvider>, token: TokenBinding, config: &SessionConfig) -> Self {
        Self {
            provider,
            token,
            rejection_code: config.rejection_code,
            receipt_poll_interval: config.receipt_poll_interval(),
        }
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        debug!(method, "wallet request");
        self.provider
            .request(method, params)
            .await
            .map_err(|e| e.classify(self.rejection_code))
    }

    /// Prompt the wallet for account access.
    pub async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        let result = self.request("eth_requestAccounts", json!([])).await?;
        let raw: Vec<String> = serde_json::from_value(result)
            .map_err(|e| WalletError::InvalidResponse(format!("account list: {e}")))?;
        parse_accounts(&raw)
    }

    /// Network id the wallet currently reports, if it parses.
    pub fn network_version(&self) -> Option<u64> {
        let raw = self.provider.network_version()?;
        let raw = raw.trim();
        match raw.strip_prefix("0x") {
            Some(hex_digits) => u64::from_str_radix(hex_digits, 16).ok(),
            None => raw.parse().ok(),
        }
    }

    /// Ask the wallet to switch to `chain_id`.
    pub async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.request(
            "wallet_switchEthereumChain",
            json!([{ "chainId": chain_id_hex(chain_id) }]),
        )
        .await
        .map(|_| ())
    }

    pub fn subscribe_accounts(&self) -> broadcast::Receiver<Vec<String>> {
        self.provider.subscribe_accounts()
    }

    async fn call(&self, function: &ContractFunction, args: &[AbiValue]) -> Result<AbiValue, WalletError> {
        let data = function
            .encode_input(args)
            .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
        let params = json!([
            { "to": self.token.address.to_hex(), "data": format!("0x{}", hex::encode(data)) },
            "latest"
        ]);
        let result = self.request("eth_call", params).await?;
        let bytes = hex_data(&result)?;
        function
            .decode_output(&bytes)
            .map_err(|e| {
                WalletError::InvalidResponse(format!("{}: {e}", function.signature.canonical))
            })?
            .into_iter()
            .next()
            .ok_or_else(|| {
                WalletError::InvalidResponse(format!(
                    "{} returned no value",
                    function.signature.canonical
                ))
            })
    }

    pub async fn name(&self) -> Result<String, WalletError> {
        self.call(&self.token.name, &[])
            .await?
            .into_string()
            .ok_or_else(|| WalletError::InvalidResponse("name() is not a string".to_string()))
    }

    pub async fn symbol(&self) -> Result<String, WalletError> {
        self.call(&self.token.symbol, &[])
            .await?
            .into_string()
            .ok_or_else(|| WalletError::InvalidResponse("symbol() is not a string".to_string()))
    }

    pub async fn total_supply(&self) -> Result<Amount, WalletError> {
        self.call(&self.token.total_supply, &[])
            .await?
            .into_uint()
            .map(Amount::from)
            .ok_or_else(|| WalletError::InvalidResponse("totalSupply() is not a uint".to_string()))
    }

    pub async fn balance_of(&self, account: Address) -> Result<Amount, WalletError> {
        self.call(&self.token.balance_of, &[AbiValue::Address(account)])
            .await?
            .into_uint()
            .map(Amount::from)
            .ok_or_else(|| WalletError::InvalidResponse("balanceOf() is not a uint".to_string()))
    }

    /// Submit `transfer(to, amount)` from `from`. Resolves once the wallet has
    /// signed and broadcast it.
    pub async fn transfer(&self, from: Address, to: Address, amount: &Amount) -> Result<TxHash, WalletError> {
        let data = self
            .token
            .transfer
            .encode_input(&[
                AbiValue::Address(to),
                AbiValue::Uint(amount.as_biguint().clone()),
            ])
            .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
        let params = json!([{
            "from": from.to_hex(),
            "to": self.token.address.to_hex(),
            "data": format!("0x{}", hex::encode(data)),
        }]);
        let result = self.request("eth_sendTransaction", params).await?;
        let hash = result
            .as_str()
            .ok_or_else(|| WalletError::InvalidResponse("transaction hash is not a string".to_string()))?;
        hash.parse::<TxHash>()
            .map_err(|e| WalletError::InvalidResponse(format!("transaction hash: {e}")))
    }

    /// Wait until `hash` is included and report its status.
    pub async fn wait(&self, hash: TxHash) -> Result<ReceiptStatus, WalletError> {
        loop {
            let receipt = self
                .request("eth_getTransactionReceipt", json!([hash.to_hex()]))
                .await?;
            if receipt.is_null() {
                tokio::time::sleep(self.receipt_poll_interval).await;
                continue;
            }
            let status = receipt
                .get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| WalletError::InvalidResponse("receipt has no status".to_string()))?;
            return Ok(match status {
                "0x1" => ReceiptStatus::Success,
                _ => ReceiptStatus::Reverted,
            });
        }
    }
}

/// Parse a wallet account list.
pub fn parse_accounts(raw: &[String]) -> Result<Vec<Address>, WalletError> {
    raw.iter()
        .map(|s| {
            s.parse::<Address>()
                .map_err(|e| WalletError::InvalidResponse(format!("account: {e}")))
        })
        .collect()
}

fn hex_data(value: &Value) -> Result<Vec<u8>, WalletError> {
    let s = value
        .as_str()
        .ok_or_else(|| WalletError::InvalidResponse("call result is not a string".to_string()))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits).map_err(|e| WalletError::InvalidResponse(format!("call result: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryWallet;
    use crate::provider::ProviderError;

    fn account(byte: u8) -> Address {
        Address::new([byte; 20])
    }

    fn client_for(wallet: &Arc<InMemoryWallet>) -> ChainClient {
        ChainClient::new(
            Arc::clone(wallet) as Arc<dyn WalletProvider>,
            wallet.token().clone(),
            &SessionConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_reads() {
        let wallet = Arc::new(InMemoryWallet::new(vec![account(0xaa)]));
        wallet.set_balance(account(0xaa), Amount::from(50u64));
        let client = client_for(&wallet);

        assert_eq!(client.name().await.unwrap(), "My Hardhat Token");
        assert_eq!(client.symbol().await.unwrap(), "MHT");
        assert_eq!(client.total_supply().await.unwrap(), Amount::from(1_000_000u64));
        assert_eq!(client.balance_of(account(0xaa)).await.unwrap(), Amount::from(50u64));
        assert_eq!(client.balance_of(account(0xbb)).await.unwrap(), Amount::zero());
    }

    #[tokio::test]
    async fn test_request_accounts_rejected() {
        let wallet = Arc::new(InMemoryWallet::new(vec![account(0xaa)]));
        wallet.fail_method(
            "eth_requestAccounts",
            ProviderError::new(4001, "User rejected the request."),
        );
        let client = client_for(&wallet);
        assert_eq!(client.request_accounts().await, Err(WalletError::Rejected));
    }

    #[tokio::test]
    async fn test_transfer_and_wait() {
        let wallet = Arc::new(InMemoryWallet::new(vec![account(0xaa)]));
        wallet.set_balance(account(0xaa), Amount::from(50u64));
        let client = client_for(&wallet);

        let hash = client
            .transfer(account(0xaa), account(0xbb), &Amount::from(10u64))
            .await
            .unwrap();
        assert_eq!(client.wait(hash).await.unwrap(), ReceiptStatus::Success);
        assert_eq!(wallet.balance_of(account(0xbb)), Amount::from(10u64));
    }

    #[tokio::test]
    async fn test_wait_reports_revert() {
        let wallet = Arc::new(InMemoryWallet::new(vec![account(0xaa)]));
        wallet.set_balance(account(0xaa), Amount::from(50u64));
        wallet.set_revert_transfers(true);
        let client = client_for(&wallet);

        let hash = client
            .transfer(account(0xaa), account(0xbb), &Amount::from(10u64))
            .await
            .unwrap();
        assert_eq!(client.wait(hash).await.unwrap(), ReceiptStatus::Reverted);
        assert_eq!(wallet.balance_of(account(0xaa)), Amount::from(50u64));
    }

    #[test]
    fn test_network_version_parsing() {
        let wallet = Arc::new(InMemoryWallet::new(vec![]));
        let client = client_for(&wallet);
        assert_eq!(client.network_version(), Some(31337));

        wallet.set_network_version("0x1");
        assert_eq!(client.network_version(), Some(1));

        wallet.set_network_version("loading");
        assert_eq!(client.network_version(), None);
    }

    #[tokio::test]
    async fn test_switch_chain_sends_hex_chain_id() {
        let wallet = Arc::new(InMemoryWallet::new(vec![]));
        wallet.set_network_version("1");
        let client = client_for(&wallet);

        client.switch_chain(31337).await.unwrap();
        assert_eq!(client.network_version(), Some(31337));
        assert_eq!(wallet.call_count("wallet_switchEthereumChain"), 1);
    }

    #[test]
    fn test_parse_accounts_rejects_garbage() {
        let raw = vec!["0x1234".to_string()];
        assert!(matches!(
            parse_accounts(&raw),
            Err(WalletError::InvalidResponse(_))
        ));
    }
}
