//! # Signing Authority
//!
//! Decides who signs an operation and produces the signatures.
//!
//! ## Architecture
//!
//! ```text
//! mod.rs      : SigningPlan, SigningAuthorityResolver, SigningError
//! keystore.rs : KeyHandle, KeyProvider trait, InMemoryKeyStore
//! multisign.rs: partial signatures and ordered aggregation
//! ```
//!
//! ## Plans
//!
//! | Preference   | Plan        | Requires                          | Fee multiplier |
//! |--------------|-------------|-----------------------------------|----------------|
//! | `Master`     | `Direct`    | master key enabled                | 1              |
//! | `RegularKey` | `Delegated` | a regular key set on the account  | 1              |
//! | `MultiSign`  | `Threshold` | a signer list containing signers  | signers + 1    |
//!
//! The plan is resolved before the operation is built so the scaled fee is
//! part of the signed payload from the start.
//!
//! Quorum is not enforced here. The ledger is the authority on whether the
//! collected weight suffices and rejects with `tefBAD_QUORUM` otherwise.

pub mod keystore;
pub mod multisign;

pub use keystore::{InMemoryKeyStore, KeyHandle, KeyProvider, KeyProviderError};
pub use multisign::{aggregate, sign_partial};

use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::address::AccountId;
use crate::ledger::context::LedgerContext;
use crate::transaction::builder::CanonicalOperation;
use crate::transaction::codec::single_signing_data;
use crate::transaction::draft::{OperationDraft, SigningPreference};
use crate::transaction::signing::{EnvelopeError, SignedEnvelope, SignedTransaction};
use crate::transaction::verification::VerificationError;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("master key of {0} is disabled; sign with the regular key or the signer list")]
    MasterDisabled(AccountId),

    #[error("key controls {got}, not the master key of {expected}")]
    MasterKeyMismatch { expected: AccountId, got: AccountId },

    #[error("account {0} has no regular key")]
    NoRegularKey(AccountId),

    #[error("key controls {got}, but the regular key of the account is {expected}")]
    RegularKeyMismatch { expected: AccountId, got: AccountId },

    #[error("account {0} has no signer list")]
    NoSignerList(AccountId),

    #[error("no signers supplied")]
    NoSigners,

    #[error("{0} is not in the account's signer list")]
    SignerNotInList(AccountId),

    #[error("signer {0} appears more than once")]
    DuplicateSigner(AccountId),

    #[error("signers out of order: {before} must come after {after}")]
    SignersUnordered { before: AccountId, after: AccountId },

    #[error("invalid signer address '{0}'")]
    InvalidSignerAddress(String),

    #[error("partial signature rejected: {0}")]
    PartialSignatureInvalid(VerificationError),

    #[error(transparent)]
    Key(#[from] KeyProviderError),

    #[error("envelope encoding failed: {0}")]
    Envelope(#[from] EnvelopeError),
}

// ---------------------------------------------------------------------------
// SigningPlan
// ---------------------------------------------------------------------------

/// One participating signer of a threshold plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedSigner {
    pub account: AccountId,
    pub weight: u16,
    pub key: KeyHandle,
}

/// The resolved signing path for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum SigningPlan {
    Direct {
        account: AccountId,
        key: KeyHandle,
    },
    Delegated {
        account: AccountId,
        regular_key: AccountId,
        key: KeyHandle,
    },
    /// Signers in the order the user supplied them.
    Threshold {
        account: AccountId,
        signers: Vec<PlannedSigner>,
        quorum: u32,
    },
}

impl SigningPlan {
    pub fn account(&self) -> AccountId {
        match self {
            Self::Direct { account, .. }
            | Self::Delegated { account, .. }
            | Self::Threshold { account, .. } => *account,
        }
    }

    /// Factor applied to the base fee: `signers + 1` for threshold plans.
    pub fn fee_multiplier(&self) -> u64 {
        match self {
            Self::Threshold { signers, .. } => signers.len() as u64 + 1,
            _ => 1,
        }
    }

    /// Summed weight of the participating signers.
    pub fn participating_weight(&self) -> u64 {
        match self {
            Self::Threshold { signers, .. } => signers.iter().map(|s| s.weight as u64).sum(),
            _ => 0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::Delegated { .. } => "delegated",
            Self::Threshold { .. } => "threshold",
        }
    }
}

// ---------------------------------------------------------------------------
// SigningAuthorityResolver
// ---------------------------------------------------------------------------

/// Resolves plans against a fetched context and signs with the key provider.
#[derive(Clone)]
pub struct SigningAuthorityResolver {
    keys: Arc<dyn KeyProvider>,
}

impl SigningAuthorityResolver {
    pub fn new(keys: Arc<dyn KeyProvider>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &dyn KeyProvider {
        self.keys.as_ref()
    }

    /// Choose the signing path for `draft`.
    ///
    /// Resolving to `Direct` while the master key is disabled is an error.
    pub fn resolve(
        &self,
        draft: &OperationDraft,
        context: &LedgerContext,
    ) -> Result<SigningPlan, SigningError> {
        let account = context.account;
        let plan = match &draft.signing {
            SigningPreference::Master { key } => {
                if context.flags.disable_master {
                    return Err(SigningError::MasterDisabled(account));
                }
                let got = self.keys.public_key(key)?.account_id();
                if got != account {
                    return Err(SigningError::MasterKeyMismatch {
                        expected: account,
                        got,
                    });
                }
                SigningPlan::Direct {
                    account,
                    key: key.clone(),
                }
            }

            SigningPreference::RegularKey { key } => {
                let expected = context
                    .regular_key
                    .ok_or(SigningError::NoRegularKey(account))?;
                let got = self.keys.public_key(key)?.account_id();
                if got != expected {
                    return Err(SigningError::RegularKeyMismatch { expected, got });
                }
                SigningPlan::Delegated {
                    account,
                    regular_key: expected,
                    key: key.clone(),
                }
            }

            SigningPreference::MultiSign { signers } => {
                let list = context
                    .signers()
                    .ok_or(SigningError::NoSignerList(account))?;
                if signers.is_empty() {
                    return Err(SigningError::NoSigners);
                }

                let mut seen = HashSet::new();
                let mut planned = Vec::with_capacity(signers.len());
                for choice in signers {
                    let signer: AccountId = choice
                        .account
                        .trim()
                        .parse()
                        .map_err(|_| SigningError::InvalidSignerAddress(choice.account.clone()))?;
                    if !seen.insert(signer) {
                        return Err(SigningError::DuplicateSigner(signer));
                    }
                    let weight = list
                        .weight_of(&signer)
                        .ok_or(SigningError::SignerNotInList(signer))?;
                    // Fail early on unknown handles rather than mid-aggregation.
                    self.keys.public_key(&choice.key)?;
                    planned.push(PlannedSigner {
                        account: signer,
                        weight,
                        key: choice.key.clone(),
                    });
                }

                let plan = SigningPlan::Threshold {
                    account,
                    signers: planned,
                    quorum: list.quorum,
                };
                if plan.participating_weight() < list.quorum as u64 {
                    warn!(
                        account = %account,
                        weight = plan.participating_weight(),
                        quorum = list.quorum,
                        "participating weight below quorum; the ledger will reject"
                    );
                }
                plan
            }
        };

        debug!(account = %account, plan = plan.label(), "signing plan resolved");
        Ok(plan)
    }

    /// Sign `op` according to `plan`.
    pub fn sign(
        &self,
        plan: &SigningPlan,
        op: &CanonicalOperation,
    ) -> Result<SignedEnvelope, SigningError> {
        match plan {
            SigningPlan::Direct { key, .. } | SigningPlan::Delegated { key, .. } => {
                let public_key = self.keys.public_key(key)?;
                let signature = self.keys.sign(key, &single_signing_data(op, &public_key))?;
                Ok(SignedEnvelope::seal(SignedTransaction {
                    operation: op.clone(),
                    signing_pub_key: public_key.to_hex(),
                    txn_signature: Some(signature.to_hex()),
                    signers: Vec::new(),
                })?)
            }
            SigningPlan::Threshold { signers, .. } => {
                let partials = signers
                    .iter()
                    .map(|s| sign_partial(op, s.account, &s.key, self.keys.as_ref()))
                    .collect::<Result<Vec<_>, _>>()?;
                aggregate(op, partials)
            }
        }
    }
}
