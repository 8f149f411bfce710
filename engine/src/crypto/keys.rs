//! # Key Management
//!
//! Ed25519 keypairs for ledger accounts and multi-signers.
//!
//! ## Key prefix
//!
//! Public keys travel as 33 bytes: a `0xED` type byte followed by the 32-byte
//! Ed25519 point. The prefix is part of the account id derivation, so an
//! Ed25519 key can never collide with an account derived from another key
//! type.
//!
//! ## Security considerations
//!
//! - Private keys are zeroized on drop (ed25519-dalek does this for us).
//! - Key bytes are never logged. `Debug` prints the public key only.

use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::address::{AccountId, ACCOUNT_ID_LENGTH};
use super::hash::sha512_half;

/// Type byte for Ed25519 public keys.
pub const ED25519_PREFIX: u8 = 0xED;

/// Errors that can occur during key operations.
///
/// Deliberately vague about *why* parsing failed.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid secret key bytes: wrong length or not hex")]
    InvalidSecretKey,

    #[error("invalid public key: expected ED-prefixed 33-byte Ed25519 key")]
    InvalidPublicKey,
}

/// An Ed25519 keypair controlling a ledger account (or acting as a
/// regular key / multi-signer for one).
///
/// `KeyPair` intentionally does NOT implement `Serialize`. Exporting secret
/// material has to go through [`KeyPair::secret_hex`] on purpose.
pub struct KeyPair {
    signing_key: SigningKey,
}

/// The public half of a keypair.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    bytes: [u8; 32],
}

/// A detached 64-byte Ed25519 signature.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    bytes: Vec<u8>,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Reconstruct a keypair from a hex-encoded 32-byte secret.
    pub fn from_hex(hex_str: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex_str.trim()).map_err(|_| KeyError::InvalidSecretKey)?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::InvalidSecretKey)?;
        Ok(Self::from_seed(&seed))
    }

    /// Export the secret as hex. Handle with care.
    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing_key.to_bytes())
    }

    /// The public key of this pair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            bytes: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// The account id this key controls as a master key.
    pub fn account_id(&self) -> AccountId {
        self.public_key().account_id()
    }

    /// Sign a message. Ed25519 is deterministic: same key and message give
    /// the same signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature {
            bytes: self.signing_key.sign(message).to_bytes().to_vec(),
        }
    }

    /// Verify a signature against this keypair's public key.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        self.public_key().verify(message, signature)
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&self.signing_key.to_bytes()),
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print secret key material, not even partially.
        write!(f, "KeyPair(pub={})", self.public_key().to_hex())
    }
}

// ---------------------------------------------------------------------------
// PublicKey
// ---------------------------------------------------------------------------

impl PublicKey {
    /// Create from the raw 32-byte point.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Raw 32-byte point.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.bytes
    }

    /// The 33-byte wire form: `0xED || point`.
    pub fn to_prefixed_bytes(&self) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = ED25519_PREFIX;
        out[1..].copy_from_slice(&self.bytes);
        out
    }

    /// Upper-case hex of the 33-byte wire form (`ED...`).
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.to_prefixed_bytes())
    }

    /// Parse the `ED`-prefixed hex form and check that it is a valid point.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let raw = hex::decode(s).map_err(|_| KeyError::InvalidPublicKey)?;
        if raw.len() != 33 || raw[0] != ED25519_PREFIX {
            return Err(KeyError::InvalidPublicKey);
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&raw[1..]);
        VerifyingKey::from_bytes(&bytes).map_err(|_| KeyError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Account id controlled by this key: the first 20 bytes of
    /// SHA-512-half over the prefixed key.
    pub fn account_id(&self) -> AccountId {
        let digest = sha512_half(&[&self.to_prefixed_bytes()]);
        let mut id = [0u8; ACCOUNT_ID_LENGTH];
        id.copy_from_slice(&digest[..ACCOUNT_ID_LENGTH]);
        AccountId::from_bytes(id)
    }

    /// Returns `true` if `signature` is a valid signature of `message`.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_bytes(&self.bytes) else {
            return false;
        };
        let sig_bytes: [u8; 64] = match signature.bytes.as_slice().try_into() {
            Ok(b) => b,
            Err(_) => return false,
        };
        verifying_key
            .verify(message, &DalekSignature::from_bytes(&sig_bytes))
            .is_ok()
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..18])
    }
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

impl Signature {
    /// Raw signature bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Upper-case hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(&self.bytes)
    }

    /// Parse a hex-encoded 64-byte signature.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 64 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self { bytes })
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex_str = self.to_hex();
        if hex_str.len() >= 128 {
            write!(f, "Signature({}...{})", &hex_str[..8], &hex_str[120..])
        } else {
            write!(f, "Signature({})", hex_str)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_sign_verify_roundtrip() {
        let kp = KeyPair::generate();
        let msg = b"pay 10 to rDest";
        let sig = kp.sign(msg);
        assert!(kp.verify(msg, &sig));
        assert!(!kp.verify(b"pay 11 to rDest", &sig));
    }

    #[test]
    fn wrong_key_fails_verification() {
        let kp1 = KeyPair::generate();
        let kp2 = KeyPair::generate();
        let sig = kp1.sign(b"message");
        assert!(!kp2.verify(b"message", &sig));
    }

    #[test]
    fn public_key_hex_is_ed_prefixed() {
        let pk = KeyPair::generate().public_key();
        let hex_str = pk.to_hex();
        assert_eq!(hex_str.len(), 66);
        assert!(hex_str.starts_with("ED"));
        assert_eq!(PublicKey::from_hex(&hex_str).unwrap(), pk);
    }

    #[test]
    fn public_key_without_prefix_is_rejected() {
        let pk = KeyPair::generate().public_key();
        assert!(PublicKey::from_hex(&hex::encode(pk.as_bytes())).is_err());
    }

    #[test]
    fn secret_hex_roundtrip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_hex(&kp.secret_hex()).unwrap();
        assert_eq!(kp.public_key(), restored.public_key());
        assert!(KeyPair::from_hex("deadbeef").is_err());
        assert!(KeyPair::from_hex("not-hex-at-all").is_err());
    }

    #[test]
    fn account_id_is_stable_for_seed() {
        let a = KeyPair::from_seed(&[42u8; 32]);
        let b = KeyPair::from_seed(&[42u8; 32]);
        assert_eq!(a.account_id(), b.account_id());
        assert_ne!(a.account_id(), KeyPair::from_seed(&[43u8; 32]).account_id());
    }

    #[test]
    fn debug_does_not_leak_secret() {
        let kp = KeyPair::generate();
        let debug_str = format!("{:?}", kp);
        assert!(debug_str.starts_with("KeyPair(pub=ED"));
        assert!(!debug_str.contains(&kp.secret_hex()));
    }

    #[test]
    fn signature_hex_roundtrip() {
        let kp = KeyPair::generate();
        let sig = kp.sign(b"test");
        assert_eq!(Signature::from_hex(&sig.to_hex()).unwrap(), sig);
        assert!(Signature::from_hex("abcd").is_err());
    }
}
