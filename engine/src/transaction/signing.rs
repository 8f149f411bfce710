//! Signed envelopes.
//!
//! Signing is a separate step from building because the plan decides who
//! signs, and because the fee (part of the signed payload) must be final
//! before anyone signs. The result is a [`SignedEnvelope`]: the serialized
//! blob plus its transaction hash, which is what gets submitted and what
//! a caller re-queries after an inconclusive submit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::builder::CanonicalOperation;
use super::codec::single_signing_data;
use crate::config::PREFIX_TRANSACTION_ID;
use crate::crypto::address::AccountId;
use crate::crypto::hash::sha512_half;
use crate::crypto::keys::KeyPair;

/// Errors producing or decoding an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("envelope encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("blob is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// One entry of a multi-signed operation's `Signers` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignerSignature {
    pub account: AccountId,
    pub signing_pub_key: String,
    pub txn_signature: String,
}

/// The signed form of an operation as it travels in the blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignedTransaction {
    #[serde(flatten)]
    pub operation: CanonicalOperation,

    /// Empty for multi-signed operations.
    #[serde(default)]
    pub signing_pub_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_signature: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub signers: Vec<SignerSignature>,
}

impl SignedTransaction {
    pub fn is_multisigned(&self) -> bool {
        !self.signers.is_empty()
    }
}

/// `{blob, hash}` for one pipeline run. Never reused across runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedEnvelope {
    blob: String,
    hash: String,
    #[serde(skip)]
    transaction: SignedTransaction,
}

impl SignedEnvelope {
    /// Serialize a signed transaction and derive its hash.
    pub fn seal(transaction: SignedTransaction) -> Result<Self, EnvelopeError> {
        let bytes = serde_json::to_vec(&transaction)?;
        Ok(Self {
            blob: hex::encode_upper(&bytes),
            hash: transaction_hash(&bytes),
            transaction,
        })
    }

    /// Decode a submitted blob. The hash is recomputed from the blob bytes.
    pub fn open(blob: &str) -> Result<Self, EnvelopeError> {
        let bytes = hex::decode(blob.trim())?;
        let transaction: SignedTransaction = serde_json::from_slice(&bytes)?;
        Ok(Self {
            blob: hex::encode_upper(&bytes),
            hash: transaction_hash(&bytes),
            transaction,
        })
    }

    pub fn blob(&self) -> &str {
        &self.blob
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn transaction(&self) -> &SignedTransaction {
        &self.transaction
    }

    pub fn operation(&self) -> &CanonicalOperation {
        &self.transaction.operation
    }
}

/// Upper-case hex of SHA-512-half over `TXN\0 || blob bytes`.
pub fn transaction_hash(blob_bytes: &[u8]) -> String {
    hex::encode_upper(sha512_half(&[&PREFIX_TRANSACTION_ID, blob_bytes]))
}

/// Sign with a single key (the master key or the regular key).
pub fn sign_single(op: &CanonicalOperation, key: &KeyPair) -> Result<SignedEnvelope, EnvelopeError> {
    let public_key = key.public_key();
    let signature = key.sign(&single_signing_data(op, &public_key));
    SignedEnvelope::seal(SignedTransaction {
        operation: op.clone(),
        signing_pub_key: public_key.to_hex(),
        txn_signature: Some(signature.to_hex()),
        signers: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::ledger::context::LedgerContext;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::draft::{AmountInput, OperationBody, OperationDraft, SigningPreference};

    fn sample_op() -> CanonicalOperation {
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        let draft = OperationDraft::new(
            AccountId::from_bytes([1; 20]).to_address(),
            OperationBody::Payment {
                destination: AccountId::from_bytes([2; 20]).to_address(),
                amount: AmountInput::native("3"),
                destination_tag: None,
            },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        );
        TransactionBuilder::new(&draft, &ctx).build().unwrap()
    }

    #[test]
    fn sealed_blob_reopens_to_same_hash() {
        let kp = KeyPair::from_seed(&[5; 32]);
        let env = sign_single(&sample_op(), &kp).unwrap();
        assert_eq!(env.hash().len(), 64);
        assert!(env.blob().chars().all(|c| !c.is_ascii_lowercase()));

        let reopened = SignedEnvelope::open(env.blob()).unwrap();
        assert_eq!(reopened.hash(), env.hash());
        assert_eq!(reopened.operation(), env.operation());
    }

    #[test]
    fn single_signature_carries_public_key() {
        let kp = KeyPair::from_seed(&[6; 32]);
        let env = sign_single(&sample_op(), &kp).unwrap();
        let tx = env.transaction();
        assert_eq!(tx.signing_pub_key, kp.public_key().to_hex());
        assert!(tx.txn_signature.is_some());
        assert!(!tx.is_multisigned());
    }

    #[test]
    fn different_keys_yield_different_hashes() {
        let op = sample_op();
        let a = sign_single(&op, &KeyPair::from_seed(&[7; 32])).unwrap();
        let b = sign_single(&op, &KeyPair::from_seed(&[8; 32])).unwrap();
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn garbage_blob_is_rejected() {
        assert!(matches!(
            SignedEnvelope::open("zz"),
            Err(EnvelopeError::Hex(_))
        ));
        assert!(matches!(
            SignedEnvelope::open(&hex::encode("{}")),
            Err(EnvelopeError::Encoding(_))
        ));
    }
}
