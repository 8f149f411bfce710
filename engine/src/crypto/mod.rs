//! # Cryptographic Primitives
//!
//! Everything that touches key material or hashing lives here:
//!
//! - **Ed25519** signatures via `ed25519-dalek`.
//! - **SHA-512-half** for transaction hashes and account ids.
//! - **base58check** addresses with the ripple alphabet.
//!
//! Nothing here is hand-rolled cryptography; these are thin typed wrappers
//! over audited crates.

pub mod address;
pub mod hash;
pub mod keys;

pub use address::{AccountId, AddressError};
pub use hash::{double_sha256, sha256, sha512_half};
pub use keys::{KeyError, KeyPair, PublicKey, Signature};
