//! In-memory wallet and token contract, for tests and demos.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use crate::abi::AbiValue;
use crate::address::{keccak256, Address, TxHash};
use crate::binding::{ContractFunction, TokenBinding};
use crate::config::LOCAL_DEV_CHAIN_ID;
use crate::provider::{ProviderError, WalletProvider};
use crate::token::Amount;

/// First contract address on a fresh local development chain.
pub const LOCAL_TOKEN_ADDRESS: Address = Address::new([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64, 0x2f,
    0x64, 0x18, 0x0a, 0xa3,
]);

/// How the wallet answers `wallet_switchEthereumChain`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchBehavior {
    Accept,
    Reject,
    Fail,
}

struct WalletState {
    accounts: Vec<Address>,
    network_version: Option<String>,
    switch_behavior: SwitchBehavior,
    name: String,
    symbol: String,
    total_supply: BigUint,
    balances: HashMap<Address, BigUint>,
    receipts: HashMap<TxHash, bool>,
    hold_receipts: bool,
    revert_transfers: bool,
    failures: HashMap<String, ProviderError>,
    call_failures: HashMap<[u8; 4], ProviderError>,
    nonce: u64,
    calls: Vec<String>,
}

/// A wallet holding `accounts`, connected to a single token contract.
pub struct InMemoryWallet {
    token: TokenBinding,
    state: Mutex<WalletState>,
    accounts_tx: broadcast::Sender<Vec<String>>,
}

impl InMemoryWallet {
    pub fn new(accounts: Vec<Address>) -> Self {
        Self::with_token(TokenBinding::standard(LOCAL_TOKEN_ADDRESS), accounts)
    }

    pub fn with_token(token: TokenBinding, accounts: Vec<Address>) -> Self {
        let (accounts_tx, _) = broadcast::channel(16);
        Self {
            token,
            state: Mutex::new(WalletState {
                accounts,
                network_version: Some(LOCAL_DEV_CHAIN_ID.to_string()),
                switch_behavior: SwitchBehavior::Accept,
                name: "My Hardhat Token".to_string(),
                symbol: "MHT".to_string(),
                total_supply: BigUint::from(1_000_000u64),
                balances: HashMap::new(),
                receipts: HashMap::new(),
                hold_receipts: false,
                revert_transfers: false,
                failures: HashMap::new(),
                call_failures: HashMap::new(),
                nonce: 0,
                calls: Vec::new(),
            }),
            accounts_tx,
        }
    }

    pub fn token(&self) -> &TokenBinding {
        &self.token
    }

    fn state(&self) -> MutexGuard<'_, WalletState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_metadata(&self, name: &str, symbol: &str) {
        let mut state = self.state();
        state.name = name.to_string();
        state.symbol = symbol.to_string();
    }

    pub fn set_total_supply(&self, total_supply: Amount) {
        self.state().total_supply = total_supply.into();
    }

    pub fn set_balance(&self, account: Address, balance: Amount) {
        self.state().balances.insert(account, balance.into());
    }

    pub fn balance_of(&self, account: Address) -> Amount {
        self.state()
            .balances
            .get(&account)
            .cloned()
            .map(Amount::from)
            .unwrap_or_default()
    }

    pub fn set_network_version(&self, version: &str) {
        self.state().network_version = Some(version.to_string());
    }

    pub fn set_switch_behavior(&self, behavior: SwitchBehavior) {
        self.state().switch_behavior = behavior;
    }

    /// While set, receipts are withheld and transfers stay pending.
    pub fn set_hold_receipts(&self, hold: bool) {
        self.state().hold_receipts = hold;
    }

    /// While set, transfers are mined with a failure status.
    pub fn set_revert_transfers(&self, revert: bool) {
        self.state().revert_transfers = revert;
    }

    /// Make every call to `method` fail with `error` until cleared.
    pub fn fail_method(&self, method: &str, error: ProviderError) {
        self.state().failures.insert(method.to_string(), error);
    }

    /// Make every `eth_call` to `function` fail with `error`; other functions
    /// keep answering.
    pub fn fail_call(&self, function: &ContractFunction, error: ProviderError) {
        self.state()
            .call_failures
            .insert(function.signature.selector, error);
    }

    /// Drop every scripted method and call failure.
    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.failures.clear();
        state.call_failures.clear();
    }

    /// Replace the account list and emit `accountsChanged`.
    pub fn set_accounts(&self, accounts: Vec<Address>) {
        let raw = accounts.iter().map(Address::to_hex).collect();
        self.state().accounts = accounts;
        // No subscribers is fine.
        let _ = self.accounts_tx.send(raw);
    }

    /// Methods requested so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state().calls.iter().filter(|m| *m == method).count()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, ProviderError> {
        let mut state = self.state();
        state.calls.push(method.to_string());
        if let Some(err) = state.failures.get(method) {
            return Err(err.clone());
        }

        match method {
            "eth_requestAccounts" | "eth_accounts" => {
                let accounts: Vec<String> = state.accounts.iter().map(Address::to_hex).collect();
                Ok(json!(accounts))
            }
            "wallet_switchEthereumChain" => {
                let chain_id = param_str(params, "chainId")?;
                let behavior = state.switch_behavior;
                match behavior {
                    SwitchBehavior::Accept => {
                        let digits = chain_id.strip_prefix("0x").unwrap_or(chain_id);
                        let id = u64::from_str_radix(digits, 16)
                            .map_err(|_| invalid_params("chainId"))?;
                        state.network_version = Some(id.to_string());
                        Ok(Value::Null)
                    }
                    SwitchBehavior::Reject => Err(ProviderError::new(4001, "User rejected the request.")),
                    SwitchBehavior::Fail => Err(ProviderError::new(
                        4902,
                        format!("Unrecognized chain ID \"{chain_id}\"."),
                    )),
                }
            }
            "eth_call" => {
                let data = param_bytes(params, "data")?;
                let output = self.execute_call(&state, &data)?;
                Ok(json!(format!("0x{}", hex::encode(output))))
            }
            "eth_sendTransaction" => {
                let from: Address = param_str(params, "from")?
                    .parse()
                    .map_err(|_| invalid_params("from"))?;
                if !state.accounts.contains(&from) {
                    return Err(ProviderError::new(
                        4100,
                        "The requested account has not been authorized by the user.",
                    ));
                }
                let data = param_bytes(params, "data")?;
                let hash = self.execute_transfer(&mut state, from, &data)?;
                Ok(json!(hash.to_hex()))
            }
            "eth_getTransactionReceipt" => {
                let hash: TxHash = params
                    .get(0)
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid_params("hash"))?
                    .parse()
                    .map_err(|_| invalid_params("hash"))?;
                if state.hold_receipts {
                    return Ok(Value::Null);
                }
                Ok(match state.receipts.get(&hash) {
                    Some(success) => json!({
                        "transactionHash": hash.to_hex(),
                        "status": if *success { "0x1" } else { "0x0" },
                    }),
                    None => Value::Null,
                })
            }
            _ => Err(ProviderError::new(
                -32601,
                format!("the method {method} does not exist/is not available"),
            )),
        }
    }

    fn execute_call(&self, state: &WalletState, data: &[u8]) -> Result<Vec<u8>, ProviderError> {
        if let Some(err) = data.get(..4).and_then(|selector| state.call_failures.get(selector)) {
            return Err(err.clone());
        }
        let token = &self.token;
        let output = if token.name.matches(data) {
            token.name.encode_output(&[AbiValue::String(state.name.clone())])
        } else if token.symbol.matches(data) {
            token.symbol.encode_output(&[AbiValue::String(state.symbol.clone())])
        } else if token.total_supply.matches(data) {
            token
                .total_supply
                .encode_output(&[AbiValue::Uint(state.total_supply.clone())])
        } else if token.balance_of.matches(data) {
            let account = token
                .balance_of
                .decode_input(data)
                .ok()
                .and_then(|args| args.into_iter().next())
                .and_then(AbiValue::into_address)
                .ok_or_else(|| invalid_params("data"))?;
            let balance = state.balances.get(&account).cloned().unwrap_or_default();
            token.balance_of.encode_output(&[AbiValue::Uint(balance)])
        } else {
            return Err(ProviderError::new(-32000, "execution reverted"));
        };
        output.map_err(|e| ProviderError::new(-32603, e.to_string()))
    }

    fn execute_transfer(
        &self,
        state: &mut WalletState,
        from: Address,
        data: &[u8],
    ) -> Result<TxHash, ProviderError> {
        let mut args = self
            .token
            .transfer
            .decode_input(data)
            .map_err(|_| invalid_params("data"))?
            .into_iter();
        let to = args
            .next()
            .and_then(AbiValue::into_address)
            .ok_or_else(|| invalid_params("data"))?;
        let amount = args
            .next()
            .and_then(AbiValue::into_uint)
            .ok_or_else(|| invalid_params("data"))?;

        let from_balance = state.balances.get(&from).cloned().unwrap_or_default();
        if from_balance < amount {
            return Err(ProviderError::new(-32603, "Internal JSON-RPC error.").with_data_message(
                "Error: VM Exception while processing transaction: reverted with reason string 'Not enough tokens'",
            ));
        }

        state.nonce += 1;
        let mut preimage = state.nonce.to_be_bytes().to_vec();
        preimage.extend_from_slice(from.as_bytes());
        let hash = TxHash::new(keccak256(&preimage));

        if state.revert_transfers {
            state.receipts.insert(hash, false);
        } else {
            state.balances.insert(from, from_balance - &amount);
            *state.balances.entry(to).or_default() += amount;
            state.receipts.insert(hash, true);
        }
        Ok(hash)
    }
}

fn invalid_params(field: &str) -> ProviderError {
    ProviderError::new(-32602, format!("invalid params: {field}"))
}

fn param_str<'a>(params: &'a Value, field: &str) -> Result<&'a str, ProviderError> {
    params
        .get(0)
        .and_then(|p| p.get(field))
        .and_then(Value::as_str)
        .ok_or_else(|| invalid_params(field))
}

fn param_bytes(params: &Value, field: &str) -> Result<Vec<u8>, ProviderError> {
    let raw = param_str(params, field)?;
    hex::decode(raw.strip_prefix("0x").unwrap_or(raw)).map_err(|_| invalid_params(field))
}

#[async_trait]
impl WalletProvider for InMemoryWallet {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        // A real wallet answers asynchronously.
        tokio::task::yield_now().await;
        self.handle(method, &params)
    }

    fn network_version(&self) -> Option<String> {
        self.state().network_version.clone()
    }

    fn subscribe_accounts(&self) -> broadcast::Receiver<Vec<String>> {
        self.accounts_tx.subscribe()
    }
}
