//! # Key Provider
//!
//! The engine never holds raw secrets itself. Drafts name a [`KeyHandle`];
//! a [`KeyProvider`] turns the handle into a public key and detached
//! signatures over bytes the engine hands it.
//!
//! [`InMemoryKeyStore`] is the provider used by the CLI (loaded from a key
//! file) and by tests. Persisting secrets is someone else's job.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

use crate::crypto::keys::{KeyPair, PublicKey, Signature};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyProviderError {
    #[error("no key stored under handle '{0}'")]
    UnknownHandle(KeyHandle),

    /// The stored secret for a handle could not be decoded. The secret itself
    /// is never included.
    #[error("secret for handle '{0}' is malformed")]
    MalformedSecret(String),
}

// ---------------------------------------------------------------------------
// KeyHandle
// ---------------------------------------------------------------------------

/// Opaque reference to a stored credential.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// KeyProvider
// ---------------------------------------------------------------------------

/// Source of detached signatures.
pub trait KeyProvider: Send + Sync {
    fn public_key(&self, handle: &KeyHandle) -> Result<PublicKey, KeyProviderError>;

    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> Result<Signature, KeyProviderError>;
}

/// Thread-safe in-memory key store.
#[derive(Default)]
pub struct InMemoryKeyStore {
    keys: RwLock<HashMap<KeyHandle, KeyPair>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `handle -> secret hex` pairs, as found in a key file.
    pub fn from_secrets<I, K, V>(secrets: I) -> Result<Self, KeyProviderError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: AsRef<str>,
    {
        let store = Self::new();
        for (name, secret) in secrets {
            let name = name.into();
            let pair = KeyPair::from_hex(secret.as_ref())
                .map_err(|_| KeyProviderError::MalformedSecret(name.clone()))?;
            store.insert(KeyHandle::new(name), pair);
        }
        Ok(store)
    }

    pub fn insert(&self, handle: KeyHandle, pair: KeyPair) {
        self.keys.write().insert(handle, pair);
    }

    /// Generate a fresh key under `handle` and return its public half.
    pub fn generate(&self, handle: KeyHandle) -> PublicKey {
        let pair = KeyPair::generate();
        let public = pair.public_key();
        self.insert(handle, pair);
        public
    }

    pub fn contains(&self, handle: &KeyHandle) -> bool {
        self.keys.read().contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.keys.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for InMemoryKeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handles: Vec<_> = self.keys.read().keys().cloned().collect();
        handles.sort();
        f.debug_struct("InMemoryKeyStore")
            .field("handles", &handles)
            .finish()
    }
}

impl KeyProvider for InMemoryKeyStore {
    fn public_key(&self, handle: &KeyHandle) -> Result<PublicKey, KeyProviderError> {
        self.keys
            .read()
            .get(handle)
            .map(KeyPair::public_key)
            .ok_or_else(|| KeyProviderError::UnknownHandle(handle.clone()))
    }

    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> Result<Signature, KeyProviderError> {
        self.keys
            .read()
            .get(handle)
            .map(|pair| pair.sign(message))
            .ok_or_else(|| KeyProviderError::UnknownHandle(handle.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signs_with_stored_key() {
        let store = InMemoryKeyStore::new();
        let pair = KeyPair::from_seed(&[3; 32]);
        store.insert(KeyHandle::new("alice"), pair.clone());

        let handle = KeyHandle::new("alice");
        let sig = store.sign(&handle, b"payload").unwrap();
        assert!(pair.verify(b"payload", &sig));
        assert_eq!(store.public_key(&handle).unwrap(), pair.public_key());
    }

    #[test]
    fn unknown_handle_is_an_error() {
        let store = InMemoryKeyStore::new();
        let err = store.sign(&KeyHandle::new("ghost"), b"x").unwrap_err();
        assert_eq!(err, KeyProviderError::UnknownHandle(KeyHandle::new("ghost")));
    }

    #[test]
    fn from_secrets_rejects_bad_hex_without_leaking_it() {
        let err = InMemoryKeyStore::from_secrets([("bob", "not-hex-secret")]).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("bob"));
        assert!(!text.contains("not-hex-secret"));
    }

    #[test]
    fn debug_lists_handles_only() {
        let pair = KeyPair::from_seed(&[4; 32]);
        let store = InMemoryKeyStore::from_secrets([("carol", pair.secret_hex())]).unwrap();
        let dbg = format!("{store:?}");
        assert!(dbg.contains("carol"));
        assert!(!dbg.contains(&pair.secret_hex()));
    }
}
