//! Cryptographic verification of signed transactions.
//!
//! This only answers "are the signatures well formed and valid over the
//! canonical bytes?". Whether the keys are *authorized* for the account
//! (master vs regular key, signer list membership, quorum) depends on
//! ledger state and is decided by the ledger.

use thiserror::Error;

use super::codec::{multi_signing_data, single_signing_data};
use super::signing::SignedTransaction;
use crate::crypto::address::AccountId;
use crate::crypto::keys::{PublicKey, Signature};

/// Structural or cryptographic failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("missing signature")]
    MissingSignature,

    #[error("malformed public key {0}")]
    MalformedKey(String),

    #[error("signature does not verify")]
    BadSignature,

    #[error("signing key and signers array are both present")]
    MixedSigning,

    #[error("signers array is not sorted by account")]
    SignersUnsorted,

    #[error("signer {0} appears more than once")]
    DuplicateSigner(AccountId),
}

/// Who produced the signatures on a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Single(PublicKey),
    /// `(signer account, key that signed for it)` in canonical order.
    Multi(Vec<(AccountId, PublicKey)>),
}

/// Check every signature on `tx` against its canonical bytes.
pub fn verify_signatures(tx: &SignedTransaction) -> Result<Authorization, VerificationError> {
    if tx.is_multisigned() {
        if !tx.signing_pub_key.is_empty() || tx.txn_signature.is_some() {
            return Err(VerificationError::MixedSigning);
        }
        return verify_multi(tx).map(Authorization::Multi);
    }

    let key = parse_key(&tx.signing_pub_key)?;
    let sig_hex = tx
        .txn_signature
        .as_deref()
        .ok_or(VerificationError::MissingSignature)?;
    let signature = Signature::from_hex(sig_hex).map_err(|_| VerificationError::BadSignature)?;
    if !key.verify(&single_signing_data(&tx.operation, &key), &signature) {
        return Err(VerificationError::BadSignature);
    }
    Ok(Authorization::Single(key))
}

fn verify_multi(tx: &SignedTransaction) -> Result<Vec<(AccountId, PublicKey)>, VerificationError> {
    let mut out: Vec<(AccountId, PublicKey)> = Vec::with_capacity(tx.signers.len());
    for signer in &tx.signers {
        if let Some((prev, _)) = out.last() {
            if *prev == signer.account {
                return Err(VerificationError::DuplicateSigner(signer.account));
            }
            if *prev > signer.account {
                return Err(VerificationError::SignersUnsorted);
            }
        }
        let key = parse_key(&signer.signing_pub_key)?;
        let signature = Signature::from_hex(&signer.txn_signature)
            .map_err(|_| VerificationError::BadSignature)?;
        let data = multi_signing_data(&tx.operation, &signer.account);
        if !key.verify(&data, &signature) {
            return Err(VerificationError::BadSignature);
        }
        out.push((signer.account, key));
    }
    Ok(out)
}

fn parse_key(hex_str: &str) -> Result<PublicKey, VerificationError> {
    if hex_str.is_empty() {
        return Err(VerificationError::MissingSignature);
    }
    PublicKey::from_hex(hex_str).map_err(|_| VerificationError::MalformedKey(hex_str.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::context::LedgerContext;
    use crate::transaction::builder::{CanonicalOperation, TransactionBuilder};
    use crate::transaction::draft::{AmountInput, OperationBody, OperationDraft, SigningPreference};
    use crate::transaction::signing::{sign_single, SignerSignature};

    fn op() -> CanonicalOperation {
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        let draft = OperationDraft::new(
            AccountId::from_bytes([1; 20]).to_address(),
            OperationBody::TicketCreate { count: "2".into() },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        );
        TransactionBuilder::new(&draft, &ctx).build().unwrap()
    }

    fn partial(op: &CanonicalOperation, kp: &KeyPair) -> SignerSignature {
        let account = kp.account_id();
        SignerSignature {
            account,
            signing_pub_key: kp.public_key().to_hex(),
            txn_signature: kp.sign(&multi_signing_data(op, &account)).to_hex(),
        }
    }

    #[test]
    fn valid_single_signature() {
        let kp = KeyPair::from_seed(&[1; 32]);
        let env = sign_single(&op(), &kp).unwrap();
        assert_eq!(
            verify_signatures(env.transaction()).unwrap(),
            Authorization::Single(kp.public_key())
        );
    }

    #[test]
    fn tampered_operation_fails() {
        let kp = KeyPair::from_seed(&[1; 32]);
        let env = sign_single(&op(), &kp).unwrap();
        let mut tx = env.transaction().clone();
        tx.signing_pub_key = KeyPair::from_seed(&[2; 32]).public_key().to_hex();
        assert_eq!(
            verify_signatures(&tx),
            Err(VerificationError::BadSignature)
        );
    }

    #[test]
    fn multi_signatures_must_be_sorted() {
        let op = op();
        let mut keys: Vec<KeyPair> = (10u8..13).map(|s| KeyPair::from_seed(&[s; 32])).collect();
        keys.sort_by_key(|k| k.account_id());

        let sorted: Vec<_> = keys.iter().map(|k| partial(&op, k)).collect();
        let tx = SignedTransaction {
            operation: op.clone(),
            signing_pub_key: String::new(),
            txn_signature: None,
            signers: sorted.clone(),
        };
        match verify_signatures(&tx).unwrap() {
            Authorization::Multi(signers) => assert_eq!(signers.len(), 3),
            other => panic!("expected multi, got {:?}", other),
        }

        let mut reversed = sorted;
        reversed.reverse();
        let tx = SignedTransaction {
            signers: reversed,
            ..tx
        };
        assert_eq!(
            verify_signatures(&tx),
            Err(VerificationError::SignersUnsorted)
        );
    }

    #[test]
    fn duplicate_signer_rejected() {
        let op = op();
        let kp = KeyPair::from_seed(&[20; 32]);
        let tx = SignedTransaction {
            operation: op.clone(),
            signing_pub_key: String::new(),
            txn_signature: None,
            signers: vec![partial(&op, &kp), partial(&op, &kp)],
        };
        assert_eq!(
            verify_signatures(&tx),
            Err(VerificationError::DuplicateSigner(kp.account_id()))
        );
    }

    #[test]
    fn mixed_signing_rejected() {
        let op = op();
        let kp = KeyPair::from_seed(&[21; 32]);
        let tx = SignedTransaction {
            operation: op.clone(),
            signing_pub_key: kp.public_key().to_hex(),
            txn_signature: None,
            signers: vec![partial(&op, &kp)],
        };
        assert_eq!(verify_signatures(&tx), Err(VerificationError::MixedSigning));
    }
}
