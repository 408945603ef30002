use std::fmt;
use std::str::FromStr;

use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Unsigned token quantity in base units.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Amount(BigUint);

impl Amount {
    pub fn zero() -> Self {
        Self(BigUint::default())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == BigUint::default()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Render with `decimals` fractional digits, trailing zeros trimmed down
    /// to at least one (`"50.0"`).
    pub fn format_units(&self, decimals: u8) -> String {
        let digits = self.0.to_string();
        let decimals = usize::from(decimals);
        if decimals == 0 {
            return digits;
        }

        // Left-pad so there is always at least one whole digit.
        let padded = format!("{digits:0>width$}", width = decimals + 1);
        let (whole, fraction) = padded.split_at(padded.len() - decimals);
        match fraction.trim_end_matches('0') {
            "" => format!("{whole}.0"),
            fraction => format!("{whole}.{fraction}"),
        }
    }

    /// Parse a decimal string such as `"1.5"` into base units.
    pub fn parse_units(text: &str, decimals: u8) -> Result<Self, Error> {
        let text = text.trim();
        let (integer_part, fraction) = text.split_once('.').unwrap_or((text, ""));
        let decimals = decimals as usize;

        if integer_part.is_empty() && fraction.is_empty() {
            return Err(Error::InvalidAmount(format!("empty amount: {text:?}")));
        }
        if !integer_part.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidAmount(format!("not a decimal number: {text:?}")));
        }
        if fraction.len() > decimals {
            return Err(Error::InvalidAmount(format!(
                "more than {decimals} fractional digits: {text:?}"
            )));
        }

        let mut digits = String::with_capacity(integer_part.len() + decimals);
        digits.push_str(integer_part);
        digits.push_str(fraction);
        digits.extend(std::iter::repeat_n('0', decimals - fraction.len()));

        BigUint::parse_bytes(digits.as_bytes(), 10)
            .map(Self)
            .ok_or_else(|| Error::InvalidAmount(format!("not a decimal number: {text:?}")))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Amount {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl From<Amount> for BigUint {
    fn from(value: Amount) -> Self {
        value.0
    }
}

impl FromStr for Amount {
    type Err = Error;

    /// Parse a raw base-unit integer.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_units(s, 0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token metadata. Fetched once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
}

/// Mutable on-chain quantities, refreshed by polling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalanceState {
    pub balance: Option<Amount>,
    pub total_supply: Option<Amount>,
}

/// Last-fetched token data for the current session.
///
/// A failed refresh never reaches the cache, so the prior value is kept.
#[derive(Debug, Clone, Default)]
pub struct TokenDataCache {
    metadata: Option<TokenMetadata>,
    balances: TokenBalanceState,
}

impl TokenDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(&self) -> Option<&TokenMetadata> {
        self.metadata.as_ref()
    }

    pub fn balances(&self) -> &TokenBalanceState {
        &self.balances
    }

    /// Record metadata for the session. Returns `false` (and keeps the
    /// existing value) if metadata was already recorded.
    pub fn set_metadata(&mut self, metadata: TokenMetadata) -> bool {
        if self.metadata.is_some() {
            return false;
        }
        self.metadata = Some(metadata);
        true
    }

    pub fn record_balance(&mut self, balance: Amount) {
        self.balances.balance = Some(balance);
    }

    pub fn record_total_supply(&mut self, total_supply: Amount) {
        self.balances.total_supply = Some(total_supply);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_units() {
        assert_eq!(Amount::from(1_000_000u64).format_units(6), "1.0");
        assert_eq!(Amount::from(1_500_000u64).format_units(6), "1.5");
        assert_eq!(Amount::from(500_000u64).format_units(6), "0.5");
        assert_eq!(Amount::from(123u64).format_units(6), "0.000123");
        assert_eq!(Amount::zero().format_units(18), "0.0");
        assert_eq!(Amount::from(42u64).format_units(0), "42");
    }

    #[test]
    fn test_parse_units() {
        assert_eq!(
            Amount::parse_units("1.5", 18).unwrap(),
            Amount::from(1_500_000_000_000_000_000u64)
        );
        assert_eq!(Amount::parse_units("10", 0).unwrap(), Amount::from(10u64));
        assert_eq!(Amount::parse_units(".25", 2).unwrap(), Amount::from(25u64));
        assert_eq!("1000".parse::<Amount>().unwrap(), Amount::from(1000u64));
    }

    #[test]
    fn test_parse_units_rejects_bad_input() {
        assert!(Amount::parse_units("", 18).is_err());
        assert!(Amount::parse_units("-1", 18).is_err());
        assert!(Amount::parse_units("1.2.3", 18).is_err());
        assert!(Amount::parse_units("0.001", 2).is_err());
        assert!("1.5".parse::<Amount>().is_err());
    }

    #[test]
    fn test_metadata_recorded_once() {
        let mut cache = TokenDataCache::new();
        assert!(cache.set_metadata(TokenMetadata {
            name: "My Hardhat Token".to_string(),
            symbol: "MHT".to_string(),
        }));
        assert!(!cache.set_metadata(TokenMetadata {
            name: "Other".to_string(),
            symbol: "OTH".to_string(),
        }));
        assert_eq!(cache.metadata().map(|m| m.symbol.as_str()), Some("MHT"));
    }

    #[test]
    fn test_cache_cleared() {
        let mut cache = TokenDataCache::new();
        cache.set_metadata(TokenMetadata {
            name: "T".to_string(),
            symbol: "T".to_string(),
        });
        cache.record_total_supply(Amount::from(1000u64));
        cache.record_balance(Amount::from(50u64));
        assert_eq!(cache.balances().balance, Some(Amount::from(50u64)));

        cache.clear();
        assert!(cache.metadata().is_none());
        assert_eq!(cache.balances(), &TokenBalanceState::default());
    }
}
