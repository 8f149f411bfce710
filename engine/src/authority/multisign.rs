//! Threshold signing: detached partial signatures and their aggregation.
//!
//! Every signer signs the same canonical bytes (empty signing key) suffixed
//! with its own account id. The aggregated `Signers` array must be strictly
//! ascending by account id; out-of-order or duplicate input is an error and
//! is never reordered here.

use tracing::debug;

use super::keystore::{KeyHandle, KeyProvider};
use super::SigningError;
use crate::crypto::address::AccountId;
use crate::transaction::builder::CanonicalOperation;
use crate::transaction::codec::multi_signing_data;
use crate::transaction::signing::{SignedEnvelope, SignedTransaction, SignerSignature};
use crate::transaction::verification::verify_signatures;

/// Produce one signer's detached signature over `op`.
pub fn sign_partial(
    op: &CanonicalOperation,
    signer: AccountId,
    key: &KeyHandle,
    keys: &dyn KeyProvider,
) -> Result<SignerSignature, SigningError> {
    let public_key = keys.public_key(key)?;
    let signature = keys.sign(key, &multi_signing_data(op, &signer))?;
    Ok(SignerSignature {
        account: signer,
        signing_pub_key: public_key.to_hex(),
        txn_signature: signature.to_hex(),
    })
}

/// Combine partial signatures into a multi-signed envelope.
///
/// Fails on an empty set, duplicate or unordered signers, and on any
/// partial that does not verify against `op` (a signer who saw a different
/// payload).
pub fn aggregate(
    op: &CanonicalOperation,
    partials: Vec<SignerSignature>,
) -> Result<SignedEnvelope, SigningError> {
    if partials.is_empty() {
        return Err(SigningError::NoSigners);
    }
    for pair in partials.windows(2) {
        if pair[0].account == pair[1].account {
            return Err(SigningError::DuplicateSigner(pair[1].account));
        }
        if pair[0].account > pair[1].account {
            return Err(SigningError::SignersUnordered {
                before: pair[0].account,
                after: pair[1].account,
            });
        }
    }

    let count = partials.len();
    let tx = SignedTransaction {
        operation: op.clone(),
        signing_pub_key: String::new(),
        txn_signature: None,
        signers: partials,
    };
    verify_signatures(&tx).map_err(SigningError::PartialSignatureInvalid)?;

    let envelope = SignedEnvelope::seal(tx)?;
    debug!(signers = count, hash = envelope.hash(), "signatures aggregated");
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::InMemoryKeyStore;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::context::LedgerContext;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::draft::{OperationBody, OperationDraft, SigningPreference};

    fn op(multiplier: u64) -> CanonicalOperation {
        let account = AccountId::from_bytes([1; 20]);
        let ctx = LedgerContext::for_tests(account);
        let draft = OperationDraft::new(
            account.to_address(),
            OperationBody::OfferCancel {
                offer_sequence: "4".into(),
            },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        );
        TransactionBuilder::new(&draft, &ctx)
            .fee_multiplier(multiplier)
            .build()
            .unwrap()
    }

    /// Three signers whose accounts sort in the returned order.
    fn signers(store: &InMemoryKeyStore) -> Vec<(AccountId, KeyHandle)> {
        let mut out: Vec<(AccountId, KeyHandle)> = (0u8..3)
            .map(|i| {
                let pair = KeyPair::from_seed(&[40 + i; 32]);
                let handle = KeyHandle::new(format!("s{i}"));
                let account = pair.account_id();
                store.insert(handle.clone(), pair);
                (account, handle)
            })
            .collect();
        out.sort_by_key(|(a, _)| *a);
        out
    }

    #[test]
    fn ordered_partials_aggregate() {
        let store = InMemoryKeyStore::new();
        let op = op(3);
        let partials = signers(&store)[..2]
            .iter()
            .map(|(a, k)| sign_partial(&op, *a, k, &store).unwrap())
            .collect::<Vec<_>>();
        let env = aggregate(&op, partials).unwrap();
        let tx = env.transaction();
        assert!(tx.is_multisigned());
        assert!(tx.signing_pub_key.is_empty());
        assert!(tx.signers.windows(2).all(|w| w[0].account < w[1].account));
    }

    #[test]
    fn unordered_partials_are_rejected_not_sorted() {
        let store = InMemoryKeyStore::new();
        let op = op(3);
        let mut partials = signers(&store)[..2]
            .iter()
            .map(|(a, k)| sign_partial(&op, *a, k, &store).unwrap())
            .collect::<Vec<_>>();
        partials.reverse();
        assert!(matches!(
            aggregate(&op, partials),
            Err(SigningError::SignersUnordered { .. })
        ));
    }

    #[test]
    fn duplicate_signer_is_rejected() {
        let store = InMemoryKeyStore::new();
        let op = op(3);
        let (a, k) = signers(&store)[0].clone();
        let p = sign_partial(&op, a, &k, &store).unwrap();
        assert_eq!(
            aggregate(&op, vec![p.clone(), p]).unwrap_err().to_string(),
            SigningError::DuplicateSigner(a).to_string()
        );
    }

    #[test]
    fn partial_over_different_payload_is_rejected() {
        let store = InMemoryKeyStore::new();
        let signed_for = op(3);
        let other = op(4);
        let partials = signers(&store)[..2]
            .iter()
            .map(|(a, k)| sign_partial(&signed_for, *a, k, &store).unwrap())
            .collect::<Vec<_>>();
        assert!(matches!(
            aggregate(&other, partials),
            Err(SigningError::PartialSignatureInvalid(_))
        ));
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(
            aggregate(&op(1), Vec::new()),
            Err(SigningError::NoSigners)
        ));
    }
}
