use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::abi::{self, AbiValue, FunctionSignature, ParamType};
use crate::address::Address;
use crate::error::{AbiError, BindingError};

/// A contract function together with its declared return types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractFunction {
    pub signature: FunctionSignature,
    pub outputs: Vec<ParamType>,
}

impl ContractFunction {
    pub fn new(name: &str, inputs: Vec<ParamType>, outputs: Vec<ParamType>) -> Self {
        Self {
            signature: FunctionSignature::new(name, inputs),
            outputs,
        }
    }

    /// Encode calldata for this function.
    pub fn encode_input(&self, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
        abi::encode_call(&self.signature, args)
    }

    /// Decode calldata addressed to this function.
    pub fn decode_input(&self, calldata: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        abi::decode_call(&self.signature, calldata)
    }

    pub fn encode_output(&self, values: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
        abi::encode_values(&self.outputs, values)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        abi::decode_values(&self.outputs, data)
    }

    /// Whether `calldata` begins with this function's selector.
    pub fn matches(&self, calldata: &[u8]) -> bool {
        calldata.len() >= 4 && calldata[..4] == self.signature.selector
    }
}

/// The deployed token contract: its address plus the functions the session uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenBinding {
    pub address: Address,
    pub name: ContractFunction,
    pub symbol: ContractFunction,
    pub total_supply: ContractFunction,
    pub balance_of: ContractFunction,
    pub transfer: ContractFunction,
}

impl TokenBinding {
    /// Binding built from the canonical ERC-20 signatures.
    pub fn standard(address: Address) -> Self {
        Self {
            address,
            name: ContractFunction::new("name", vec![], vec![ParamType::String]),
            symbol: ContractFunction::new("symbol", vec![], vec![ParamType::String]),
            total_supply: ContractFunction::new("totalSupply", vec![], vec![ParamType::Uint(256)]),
            balance_of: ContractFunction::new(
                "balanceOf",
                vec![ParamType::Address],
                vec![ParamType::Uint(256)],
            ),
            transfer: ContractFunction::new(
                "transfer",
                vec![ParamType::Address, ParamType::Uint(256)],
                vec![],
            ),
        }
    }

    /// Binding built from a compiled contract artifact. Every function the
    /// session calls must be present in the artifact's ABI.
    pub fn from_artifact(artifact: &ContractArtifact, address: Address) -> Result<Self, BindingError> {
        let standard = Self::standard(address);
        Ok(Self {
            address,
            name: artifact.require(&standard.name)?,
            symbol: artifact.require(&standard.symbol)?,
            total_supply: artifact.require(&standard.total_supply)?,
            balance_of: artifact.require(&standard.balance_of)?,
            transfer: artifact.require(&standard.transfer)?,
        })
    }

    /// Resolve the deployed address by contract name, then bind the artifact.
    pub fn resolve(
        artifact: &ContractArtifact,
        deployments: &dyn DeploymentSource,
    ) -> Result<Self, BindingError> {
        let contract = artifact
            .contract_name
            .as_deref()
            .ok_or_else(|| BindingError::Parse("artifact has no contractName".to_string()))?;
        let address = deployments.resolve(contract)?;
        Self::from_artifact(artifact, address)
    }
}

/// A compiled contract artifact, as written by the contract toolchain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractArtifact {
    #[serde(rename = "contractName")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,

    pub abi: Vec<AbiEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiEntry {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub inputs: Vec<AbiParam>,

    #[serde(default)]
    pub outputs: Vec<AbiParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,
}

impl ContractArtifact {
    /// Parse an artifact from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Find the ABI function matching `expected` by name and input types.
    /// Entries with types this crate cannot encode are skipped.
    fn require(&self, expected: &ContractFunction) -> Result<ContractFunction, BindingError> {
        let signature = &expected.signature;
        self.abi
            .iter()
            .filter(|entry| entry.kind == "function")
            .filter(|entry| entry.name.as_deref() == Some(signature.name.as_str()))
            .find_map(|entry| {
                let inputs = parse_params(&entry.inputs).ok()?;
                if inputs != signature.params {
                    return None;
                }
                let outputs = parse_params(&entry.outputs).ok()?;
                Some(ContractFunction::new(&signature.name, inputs, outputs))
            })
            .ok_or_else(|| BindingError::MissingFunction(signature.canonical.clone()))
    }
}

fn parse_params(params: &[AbiParam]) -> Result<Vec<ParamType>, AbiError> {
    params.iter().map(|p| abi::parse_param_type(&p.kind)).collect()
}

/// Trait for deployed-address sources.
pub trait DeploymentSource {
    fn resolve(&self, contract: &str) -> Result<Address, BindingError>;
}

/// Static in-memory deployment map (`{"Token": "0x..."}`).
#[derive(Debug, Clone, Default)]
pub struct StaticDeployments {
    addresses: HashMap<String, Address>,
}

impl StaticDeployments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, contract: &str, address: Address) {
        self.addresses.insert(contract.to_string(), address);
    }

    /// Load a deployment map from JSON.
    pub fn from_json(json: &str) -> Result<Self, BindingError> {
        let raw: HashMap<String, String> =
            serde_json::from_str(json).map_err(|e| BindingError::Parse(e.to_string()))?;
        let addresses = raw
            .into_iter()
            .map(|(name, addr)| Ok((name, addr.parse::<Address>()?)))
            .collect::<Result<HashMap<_, _>, BindingError>>()?;
        Ok(Self { addresses })
    }
}

impl DeploymentSource for StaticDeployments {
    fn resolve(&self, contract: &str) -> Result<Address, BindingError> {
        self.addresses
            .get(contract)
            .copied()
            .ok_or_else(|| BindingError::NotFound {
                contract: contract.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_artifact_json() -> &'static str {
        r#"{
            "contractName": "Token",
            "abi": [
                { "type": "constructor", "inputs": [] },
                {
                    "type": "event",
                    "name": "Transfer",
                    "inputs": [
                        { "name": "_from", "type": "address" },
                        { "name": "_to", "type": "address" },
                        { "name": "_value", "type": "uint256" }
                    ]
                },
                { "type": "function", "name": "name", "inputs": [], "outputs": [{ "name": "", "type": "string" }] },
                { "type": "function", "name": "symbol", "inputs": [], "outputs": [{ "name": "", "type": "string" }] },
                { "type": "function", "name": "totalSupply", "inputs": [], "outputs": [{ "name": "", "type": "uint256" }] },
                { "type": "function", "name": "owner", "inputs": [], "outputs": [{ "name": "", "type": "address" }] },
                {
                    "type": "function",
                    "name": "balanceOf",
                    "inputs": [{ "name": "account", "type": "address" }],
                    "outputs": [{ "name": "", "type": "uint256" }]
                },
                {
                    "type": "function",
                    "name": "transfer",
                    "inputs": [{ "name": "to", "type": "address" }, { "name": "amount", "type": "uint256" }],
                    "outputs": []
                }
            ]
        }"#
    }

    #[test]
    fn test_binding_from_artifact() {
        let artifact = ContractArtifact::from_json(token_artifact_json()).unwrap();
        let address = Address::new([0x5f; 20]);
        let binding = TokenBinding::from_artifact(&artifact, address).unwrap();

        assert_eq!(binding.address, address);
        assert_eq!(binding, TokenBinding::standard(address));
        assert_eq!(hex::encode(binding.transfer.signature.selector), "a9059cbb");
    }

    #[test]
    fn test_binding_missing_function() {
        let artifact = ContractArtifact::from_json(
            r#"{ "contractName": "Token", "abi": [
                { "type": "function", "name": "name", "inputs": [], "outputs": [{ "type": "string" }] }
            ] }"#,
        )
        .unwrap();
        let result = TokenBinding::from_artifact(&artifact, Address::new([0; 20]));
        assert_eq!(result, Err(BindingError::MissingFunction("symbol()".to_string())));
    }

    #[test]
    fn test_resolve_through_deployments() {
        let artifact = ContractArtifact::from_json(token_artifact_json()).unwrap();
        let deployments = StaticDeployments::from_json(
            r#"{ "Token": "0x5FbDB2315678afecb367f032d93F642f64180aa3" }"#,
        )
        .unwrap();
        let binding = TokenBinding::resolve(&artifact, &deployments).unwrap();
        assert_eq!(
            binding.address.to_checksum(),
            "0x5FbDB2315678afecb367f032d93F642f64180aa3"
        );

        let empty = StaticDeployments::new();
        assert!(matches!(
            TokenBinding::resolve(&artifact, &empty),
            Err(BindingError::NotFound { .. })
        ));
    }

    #[test]
    fn test_deployments_reject_bad_address() {
        let result = StaticDeployments::from_json(r#"{ "Token": "0x1234" }"#);
        assert!(matches!(result, Err(BindingError::InvalidHex(_))));
    }
}
