//! Shared type definitions for the game
//!
//! Canonical identity, amount and range types used by the engine, the
//! persistence layer and the API.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Amount in smallest native-currency units
pub type Amount = u128;

/// Round identifier (starts at 1)
pub type RoundId = u64;

/// Block height
pub type BlockNumber = u64;

/// 32-byte block hash
pub type BlockHash = [u8; 32];

/// 20-byte participant identity, rendered as `0x`-prefixed hex
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor filling every byte with `byte`
    pub fn repeat_byte(byte: u8) -> Self {
        Self([byte; 20])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

/// Address parsing failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressParseError {
    #[error("invalid hex in address: {0}")]
    InvalidHex(String),

    #[error("address must be 20 bytes, got {0}")]
    InvalidLength(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Self(array))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Inclusive wager range, expressed in whole guess units scaled by `unit`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRange {
    pub min_guess: u64,
    pub max_guess: u64,
    pub unit: Amount,
}

impl BetRange {
    pub fn new(min_guess: u64, max_guess: u64, unit_decimals: u32) -> Self {
        Self {
            min_guess,
            max_guess,
            unit: 10u128.pow(unit_decimals),
        }
    }

    pub fn min_bet(&self) -> Amount {
        self.min_guess as Amount * self.unit
    }

    pub fn max_bet(&self) -> Amount {
        self.max_guess as Amount * self.unit
    }

    /// Number of distinct winning values
    pub fn span(&self) -> u64 {
        self.max_guess - self.min_guess + 1
    }

    pub fn contains(&self, amount: Amount) -> bool {
        amount >= self.min_bet() && amount <= self.max_bet()
    }

    /// Scale a whole-unit guess to smallest units
    pub fn scale(&self, guess: u64) -> Amount {
        guess as Amount * self.unit
    }

    /// Whole units in `amount`, truncating
    pub fn to_units(&self, amount: Amount) -> u128 {
        amount / self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_roundtrip_through_display() {
        let address = Address::repeat_byte(0xab);
        let text = address.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 42);
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        let err = "0xdeadbeef".parse::<Address>().unwrap_err();
        assert_eq!(err, AddressParseError::InvalidLength(4));
        assert!("0xzz".parse::<Address>().is_err());
    }

    #[test]
    fn test_address_serde_as_hex_string() {
        let address = Address::repeat_byte(1);
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, format!("\"{}\"", address));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }

    #[test]
    fn test_bet_range_bounds() {
        let range = BetRange::new(10, 50, 18);
        assert_eq!(range.min_bet(), 10 * 10u128.pow(18));
        assert_eq!(range.max_bet(), 50 * 10u128.pow(18));
        assert_eq!(range.span(), 41);
        assert!(range.contains(range.min_bet()));
        assert!(range.contains(range.max_bet()));
        assert!(!range.contains(range.min_bet() - 1));
        assert!(!range.contains(range.max_bet() + 1));
    }
}
