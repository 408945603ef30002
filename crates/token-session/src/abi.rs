use num_bigint::BigUint;

use crate::address::{keccak256, Address};
use crate::error::AbiError;

/// Parsed function signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    pub params: Vec<ParamType>,
    pub canonical: String,
    pub selector: [u8; 4],
}

impl FunctionSignature {
    /// Build a signature from a name and parameter list.
    pub fn new(name: &str, params: Vec<ParamType>) -> Self {
        let canonical = format!("{}({})", name, canonical_params(&params));
        let selector = selector_from_signature(&canonical);
        Self {
            name: name.to_string(),
            params,
            canonical,
            selector,
        }
    }
}

/// ABI parameter types used by token contracts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    Address,
    Uint(usize),
    Bool,
    String,
}

impl ParamType {
    /// Whether this type is dynamically-sized in ABI encoding.
    pub fn is_dynamic(&self) -> bool {
        matches!(self, ParamType::String)
    }

    pub fn canonical(&self) -> String {
        match self {
            ParamType::Address => "address".to_string(),
            ParamType::Uint(bits) => format!("uint{bits}"),
            ParamType::Bool => "bool".to_string(),
            ParamType::String => "string".to_string(),
        }
    }
}

/// A typed ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Address(Address),
    Uint(BigUint),
    Bool(bool),
    String(String),
}

impl AbiValue {
    pub fn into_uint(self) -> Option<BigUint> {
        match self {
            AbiValue::Uint(n) => Some(n),
            _ => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            AbiValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_address(self) -> Option<Address> {
        match self {
            AbiValue::Address(a) => Some(a),
            _ => None,
        }
    }
}

/// Parse a function signature string into a `FunctionSignature`.
///
/// Example: `"transfer(address,uint256)"` → name="transfer", params=[Address, Uint(256)]
pub fn parse_signature(sig: &str) -> Result<FunctionSignature, AbiError> {
    let sig = sig.trim();
    let open = sig
        .find('(')
        .ok_or_else(|| AbiError::InvalidSignature(format!("missing '(' in: {sig}")))?;

    if !sig.ends_with(')') {
        return Err(AbiError::InvalidSignature(format!("missing ')' in: {sig}")));
    }

    let name = &sig[..open];
    if name.is_empty() {
        return Err(AbiError::InvalidSignature("empty function name".to_string()));
    }

    let params_str = &sig[open + 1..sig.len() - 1];
    let params = if params_str.trim().is_empty() {
        vec![]
    } else {
        params_str
            .split(',')
            .map(parse_param_type)
            .collect::<Result<Vec<_>, _>>()?
    };

    Ok(FunctionSignature::new(name, params))
}

/// Parse a single param type string.
pub fn parse_param_type(s: &str) -> Result<ParamType, AbiError> {
    let s = s.trim();
    match s {
        "address" => Ok(ParamType::Address),
        "bool" => Ok(ParamType::Bool),
        "string" => Ok(ParamType::String),
        _ if s.starts_with("uint") => {
            let bits = if s == "uint" {
                256
            } else {
                s[4..]
                    .parse::<usize>()
                    .map_err(|_| AbiError::InvalidSignature(format!("invalid uint width: {s}")))?
            };
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(AbiError::InvalidSignature(format!("invalid uint width: {s}")));
            }
            Ok(ParamType::Uint(bits))
        }
        "" => Err(AbiError::InvalidSignature("empty parameter type".to_string())),
        _ => Err(AbiError::UnsupportedType(s.to_string())),
    }
}

fn canonical_params(params: &[ParamType]) -> String {
    params
        .iter()
        .map(ParamType::canonical)
        .collect::<Vec<_>>()
        .join(",")
}

/// Compute the 4-byte selector from a canonical function signature.
pub fn selector_from_signature(canonical: &str) -> [u8; 4] {
    let hash = keccak256(canonical.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Encode a call: selector followed by the ABI-encoded arguments.
pub fn encode_call(sig: &FunctionSignature, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
    let mut out = sig.selector.to_vec();
    out.extend(encode_values(&sig.params, args)?);
    Ok(out)
}

/// ABI-encode a value list against its declared types (head/tail layout).
pub fn encode_values(params: &[ParamType], values: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
    if params.len() != values.len() {
        return Err(AbiError::ArgumentMismatch(format!(
            "expected {} values, got {}",
            params.len(),
            values.len()
        )));
    }

    let head_len = 32 * params.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for (param, value) in params.iter().zip(values) {
        match (param, value) {
            (ParamType::Address, AbiValue::Address(addr)) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(addr.as_bytes());
                head.extend_from_slice(&word);
            }
            (ParamType::Uint(bits), AbiValue::Uint(n)) => {
                if n.bits() > *bits as u64 {
                    return Err(AbiError::InvalidEncoding(format!(
                        "value {n} does not fit in uint{bits}"
                    )));
                }
                head.extend_from_slice(&uint_word(n));
            }
            (ParamType::Bool, AbiValue::Bool(b)) => {
                let mut word = [0u8; 32];
                word[31] = u8::from(*b);
                head.extend_from_slice(&word);
            }
            (ParamType::String, AbiValue::String(s)) => {
                head.extend_from_slice(&uint_word(&BigUint::from(head_len + tail.len())));
                tail.extend_from_slice(&uint_word(&BigUint::from(s.len())));
                tail.extend_from_slice(s.as_bytes());
                let padding = (32 - s.len() % 32) % 32;
                tail.extend(std::iter::repeat_n(0u8, padding));
            }
            (param, value) => {
                return Err(AbiError::ArgumentMismatch(format!(
                    "{} cannot encode {:?}",
                    param.canonical(),
                    value
                )));
            }
        }
    }

    head.extend(tail);
    Ok(head)
}

fn uint_word(n: &BigUint) -> [u8; 32] {
    let bytes = n.to_bytes_be();
    let mut word = [0u8; 32];
    let len = bytes.len().min(32);
    word[32 - len..].copy_from_slice(&bytes[bytes.len() - len..]);
    word
}

/// Decode calldata using a parsed function signature.
pub fn decode_call(sig: &FunctionSignature, calldata: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    if calldata.len() < 4 {
        return Err(AbiError::DataTooShort {
            expected: 4,
            actual: calldata.len(),
        });
    }

    let actual_selector = &calldata[..4];
    if actual_selector != sig.selector {
        return Err(AbiError::SelectorMismatch {
            expected: hex::encode(sig.selector),
            actual: hex::encode(actual_selector),
        });
    }

    decode_values(&sig.params, &calldata[4..])
}

/// Decode ABI-encoded data (return data, or calldata without its selector).
pub fn decode_values(params: &[ParamType], data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    let mut values = Vec::with_capacity(params.len());
    let mut offset = 0;
    for param in params {
        let value = if param.is_dynamic() {
            let tail_offset = read_u256_as_usize(data, offset)?;
            decode_value_at(param, data, tail_offset)?
        } else {
            decode_value_at(param, data, offset)?
        };
        values.push(value);
        offset += 32;
    }
    Ok(values)
}

fn decode_value_at(param: &ParamType, data: &[u8], offset: usize) -> Result<AbiValue, AbiError> {
    ensure_bytes(data, offset, 32)?;
    let word = &data[offset..offset + 32];

    match param {
        ParamType::Address => {
            let mut addr = [0u8; 20];
            addr.copy_from_slice(&word[12..32]);
            Ok(AbiValue::Address(Address::new(addr)))
        }
        ParamType::Uint(_) => Ok(AbiValue::Uint(BigUint::from_bytes_be(word))),
        ParamType::Bool => Ok(AbiValue::Bool(word[31] != 0)),
        ParamType::String => {
            let len = read_u256_as_usize(data, offset)?;
            let start = offset + 32;
            ensure_bytes(data, start, len)?;
            let s = std::str::from_utf8(&data[start..start + len])
                .map_err(|e| AbiError::InvalidEncoding(format!("invalid UTF-8: {e}")))?;
            Ok(AbiValue::String(s.to_string()))
        }
    }
}

fn read_u256_as_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    ensure_bytes(data, offset, 32)?;
    let word = &data[offset..offset + 32];
    // High bytes must be zero for the offset to fit in usize
    if word[..24].iter().any(|&b| b != 0) {
        return Err(AbiError::InvalidEncoding(
            "offset too large for usize".to_string(),
        ));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..32]);
    usize::try_from(u64::from_be_bytes(bytes))
        .map_err(|_| AbiError::InvalidEncoding("offset too large for usize".to_string()))
}

fn ensure_bytes(data: &[u8], offset: usize, len: usize) -> Result<(), AbiError> {
    match offset.checked_add(len) {
        Some(end) if end <= data.len() => Ok(()),
        _ => Err(AbiError::DataTooShort {
            expected: offset.saturating_add(len),
            actual: data.len(),
        }),
    }
}
