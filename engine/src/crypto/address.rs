//! # Account Identifiers and Addresses
//!
//! An account is identified on the ledger by 20 raw bytes. Humans see the
//! base58 address form: `0x00 || account_id || checksum[4]` encoded with the
//! ripple alphabet, which makes every address start with `r`.
//!
//! The raw byte order is also the *canonical ordering* of accounts. The
//! ledger requires multi-signature `Signers` arrays to be sorted by it, so
//! `Ord` on [`AccountId`] compares raw bytes and nothing else.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use super::hash::double_sha256;

/// Version byte prepended to account ids before encoding.
const ACCOUNT_ID_VERSION: u8 = 0x00;

/// Length of an account identifier in bytes.
pub const ACCOUNT_ID_LENGTH: usize = 20;

/// Errors from address parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("address is not valid base58: {0}")]
    InvalidEncoding(String),

    #[error("address has wrong length: expected 25 decoded bytes, got {0}")]
    InvalidLength(usize),

    #[error("address has unexpected version byte 0x{0:02X}")]
    InvalidVersion(u8),

    #[error("address checksum mismatch")]
    ChecksumMismatch,
}

/// A 20-byte ledger account identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountId([u8; ACCOUNT_ID_LENGTH]);

impl AccountId {
    /// Wrap raw bytes.
    pub fn from_bytes(bytes: [u8; ACCOUNT_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Raw bytes in canonical order.
    pub fn as_bytes(&self) -> &[u8; ACCOUNT_ID_LENGTH] {
        &self.0
    }

    /// Encode as a base58check address.
    pub fn to_address(&self) -> String {
        let mut payload = Vec::with_capacity(1 + ACCOUNT_ID_LENGTH + 4);
        payload.push(ACCOUNT_ID_VERSION);
        payload.extend_from_slice(&self.0);
        let checksum = double_sha256(&payload);
        payload.extend_from_slice(&checksum[..4]);
        bs58::encode(payload)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_string()
    }

    /// Parse a base58check address, verifying version byte and checksum.
    pub fn from_address(address: &str) -> Result<Self, AddressError> {
        let decoded = bs58::decode(address)
            .with_alphabet(bs58::Alphabet::RIPPLE)
            .into_vec()
            .map_err(|e| AddressError::InvalidEncoding(e.to_string()))?;

        if decoded.len() != 1 + ACCOUNT_ID_LENGTH + 4 {
            return Err(AddressError::InvalidLength(decoded.len()));
        }
        if decoded[0] != ACCOUNT_ID_VERSION {
            return Err(AddressError::InvalidVersion(decoded[0]));
        }

        let (payload, checksum) = decoded.split_at(1 + ACCOUNT_ID_LENGTH);
        if double_sha256(payload)[..4] != *checksum {
            return Err(AddressError::ChecksumMismatch);
        }

        let mut bytes = [0u8; ACCOUNT_ID_LENGTH];
        bytes.copy_from_slice(&payload[1..]);
        Ok(Self(bytes))
    }

    /// Upper-case hex of the raw bytes, as used in canonical serialization.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl FromStr for AccountId {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_address(s)
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_address())
    }
}

impl fmt::Debug for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccountId({})", self.to_address())
    }
}

// Accounts travel as addresses in every JSON payload.
impl Serialize for AccountId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_address())
    }
}

impl<'de> Deserialize<'de> for AccountId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_address(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_roundtrip() {
        let id = AccountId::from_bytes([7u8; 20]);
        let addr = id.to_address();
        assert!(addr.starts_with('r'));
        assert_eq!(AccountId::from_address(&addr).unwrap(), id);
    }

    #[test]
    fn zero_account_encodes_to_well_known_address() {
        // The all-zero account id is the ledger's "black hole" address.
        let id = AccountId::from_bytes([0u8; 20]);
        assert_eq!(id.to_address(), "rrrrrrrrrrrrrrrrrrrrrhoLvTp");
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let addr = AccountId::from_bytes([9u8; 20]).to_address();
        let mut chars: Vec<char> = addr.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'r' { 'p' } else { 'r' };
        let corrupted: String = chars.into_iter().collect();
        assert!(AccountId::from_address(&corrupted).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            AccountId::from_address("not an address"),
            Err(AddressError::InvalidEncoding(_))
        ));
        assert!(AccountId::from_address("").is_err());
    }

    #[test]
    fn ordering_is_bytewise() {
        let mut low = [0u8; 20];
        low[0] = 0x01;
        let mut high = [0u8; 20];
        high[0] = 0x02;
        assert!(AccountId::from_bytes(low) < AccountId::from_bytes(high));
    }

    #[test]
    fn serde_uses_address_form() {
        let id = AccountId::from_bytes([3u8; 20]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id.to_address()));
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
