//! # Hashing Utilities
//!
//! The ledger uses two members of the SHA-2 family and nothing else:
//!
//! - **SHA-512-half**: the first 32 bytes of SHA-512. Transaction hashes and
//!   account identifier derivation both go through it. It is as fast as
//!   SHA-256 on 64-bit hardware and the truncation removes length-extension
//!   concerns.
//!
//! - **double SHA-256**: only used for the 4-byte address checksum, where
//!   every base58check implementation on earth expects it.

use sha2::{Digest, Sha256, Sha512};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use ledgerflow::crypto::sha256;
///
/// let hash = sha256(b"ledgerflow");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Compute the double-SHA-256 hash: `SHA-256(SHA-256(data))`.
///
/// Used for the address checksum. The first four bytes of the digest are
/// appended to the versioned payload before base58 encoding.
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    sha256(&sha256(data))
}

/// First half of a SHA-512 digest over the concatenation of `parts`.
///
/// Taking a slice of parts lets callers hash `prefix || payload` without
/// allocating a joined buffer first.
pub fn sha512_half(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&digest[..32]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc") from FIPS 180-2.
        let hash = sha256(b"abc");
        assert_eq!(
            hex::encode(hash),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn double_sha256_differs_from_single() {
        let single = sha256(b"ledger");
        let double = double_sha256(b"ledger");
        assert_ne!(single, double);
        assert_eq!(double, sha256(&single));
    }

    #[test]
    fn sha512_half_known_vector() {
        // SHA-512("abc") begins with ddaf35a193617aba...
        let half = sha512_half(&[b"abc"]);
        assert_eq!(
            hex::encode(half),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a"
        );
    }

    #[test]
    fn sha512_half_parts_equal_concatenation() {
        let joined = sha512_half(&[b"TXN\0payload"]);
        let parts = sha512_half(&[b"TXN\0", b"payload"]);
        assert_eq!(joined, parts);
    }
}
