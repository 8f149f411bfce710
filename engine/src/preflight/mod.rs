//! # Preflight Validation
//!
//! Checks a draft against the fetched context before anything is signed.
//!
//! Every rule in the table for the draft's kind runs, plus the common
//! rules, and all issues come back together. Rules that need a ledger read
//! (destination flags, issuer existence) only run once every synchronous
//! rule has passed, so an obviously broken draft costs no network calls.

pub mod rules;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use self::rules::{rules_for, AsyncRule, COMMON};
use crate::ledger::client::{LedgerReader, NetworkError};
use crate::ledger::context::LedgerContext;
use crate::transaction::builder::BuildError;
use crate::transaction::draft::{parse_address, parse_optional_u32, OperationBody, OperationDraft};
use crate::transaction::types::{Amount, Drops, FieldError};

// ---------------------------------------------------------------------------
// ValidationIssue
// ---------------------------------------------------------------------------

/// One problem with a draft, tied to the field it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }

    /// `"<field> <reason>"`, e.g. `"amount is required"`.
    pub fn field(name: &str, error: &FieldError) -> Self {
        Self::new(name, format!("{name} {error}"))
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<&BuildError> for ValidationIssue {
    fn from(e: &BuildError) -> Self {
        Self::new(e.field(), e.to_string())
    }
}

// ---------------------------------------------------------------------------
// PreflightValidator
// ---------------------------------------------------------------------------

pub struct PreflightValidator {
    reader: Arc<dyn LedgerReader>,
}

impl PreflightValidator {
    pub fn new(reader: Arc<dyn LedgerReader>) -> Self {
        Self { reader }
    }

    /// Run the synchronous rules only.
    pub fn validate_local(draft: &OperationDraft, context: &LedgerContext) -> Vec<ValidationIssue> {
        let set = rules_for(draft.kind());
        COMMON
            .iter()
            .chain(set.sync)
            .filter_map(|rule| {
                let issue = (rule.check)(draft, context);
                if let Some(i) = &issue {
                    debug!(rule = rule.name, field = %i.field, "preflight rule failed");
                }
                issue
            })
            .collect()
    }

    /// Full validation. An empty list means the draft may proceed.
    ///
    /// Network failures during the ledger-dependent checks are returned as
    /// errors rather than issues.
    pub async fn validate(
        &self,
        draft: &OperationDraft,
        context: &LedgerContext,
    ) -> Result<Vec<ValidationIssue>, NetworkError> {
        let issues = Self::validate_local(draft, context);
        if !issues.is_empty() {
            return Ok(issues);
        }

        let deferred = rules_for(draft.kind()).deferred;
        let results = try_join_all(
            deferred
                .iter()
                .map(|rule| self.run_deferred(*rule, draft, context)),
        )
        .await?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn run_deferred(
        &self,
        rule: AsyncRule,
        draft: &OperationDraft,
        context: &LedgerContext,
    ) -> Result<Option<ValidationIssue>, NetworkError> {
        match (rule, &draft.operation) {
            (
                AsyncRule::DestinationRequirements,
                OperationBody::Payment {
                    destination,
                    amount,
                    destination_tag,
                },
            ) => {
                let native = amount.parse().ok().and_then(|a| match a {
                    Amount::Native(d) => Some(d),
                    Amount::Issued(_) => None,
                });
                self.destination_requirements(destination, destination_tag.as_deref(), native, context)
                    .await
            }
            (
                AsyncRule::DestinationRequirements,
                OperationBody::EscrowCreate {
                    destination,
                    destination_tag,
                    ..
                },
            ) => {
                self.destination_requirements(destination, destination_tag.as_deref(), None, context)
                    .await
            }
            (AsyncRule::IssuerExists, OperationBody::TrustSet { limit }) => {
                let Ok(issued) = limit.parse_issued() else {
                    return Ok(None);
                };
                match self.reader.account_info(&issued.issuer).await {
                    Ok(_) => Ok(None),
                    Err(NetworkError::AccountNotFound(_)) => Ok(Some(ValidationIssue::new(
                        "limit",
                        format!("issuer {} does not exist", issued.issuer),
                    ))),
                    Err(e) => Err(e),
                }
            }
            _ => Ok(None),
        }
    }

    /// `native_amount` is set for native payments, which may create the
    /// destination if they carry at least the base reserve.
    async fn destination_requirements(
        &self,
        destination: &str,
        tag: Option<&str>,
        native_amount: Option<Drops>,
        context: &LedgerContext,
    ) -> Result<Option<ValidationIssue>, NetworkError> {
        let Ok(dest) = parse_address(destination) else {
            return Ok(None);
        };
        let has_tag = matches!(parse_optional_u32(tag), Ok(Some(_)));

        match self.reader.account_info(&dest).await {
            Ok(info) if info.flags.require_dest_tag && !has_tag => Ok(Some(ValidationIssue::new(
                "destination_tag",
                "the destination requires a destination tag",
            ))),
            Ok(_) => Ok(None),
            Err(NetworkError::AccountNotFound(_)) => match native_amount {
                Some(amount) if amount >= context.reserves.base => Ok(None),
                Some(_) => Ok(Some(ValidationIssue::new(
                    "amount",
                    format!(
                        "destination does not exist; sending at least {} creates it",
                        context.reserves.base
                    ),
                ))),
                None => Ok(Some(ValidationIssue::new(
                    "destination",
                    "destination account does not exist",
                ))),
            },
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::crypto::address::AccountId;
    use crate::ledger::sandbox::SandboxLedger;
    use crate::transaction::draft::{AmountInput, SigningPreference};
    use crate::transaction::types::AccountFlag;

    fn addr(b: u8) -> String {
        AccountId::from_bytes([b; 20]).to_address()
    }

    fn master() -> SigningPreference {
        SigningPreference::Master {
            key: KeyHandle::new("k"),
        }
    }

    fn payment(to: String, amount: &str) -> OperationDraft {
        OperationDraft::new(
            addr(1),
            OperationBody::Payment {
                destination: to,
                amount: AmountInput::native(amount),
                destination_tag: None,
            },
            master(),
        )
    }

    fn setup() -> (Arc<SandboxLedger>, PreflightValidator, LedgerContext) {
        let ledger = Arc::new(SandboxLedger::new());
        ledger.fund(AccountId::from_bytes([1; 20]), Drops(100_000_000));
        ledger.fund(AccountId::from_bytes([2; 20]), Drops(100_000_000));
        let validator = PreflightValidator::new(ledger.clone());
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        (ledger, validator, ctx)
    }

    #[tokio::test]
    async fn valid_payment_has_no_issues() {
        let (_l, v, ctx) = setup();
        assert!(v.validate(&payment(addr(2), "10"), &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_sync_issues_reported_together() {
        let (_l, v, ctx) = setup();
        let draft = payment(addr(1), "abc").with_source_tag("x");
        let issues = v.validate(&draft, &ctx).await.unwrap();
        let fields: Vec<&str> = issues.iter().map(|i| i.field.as_str()).collect();
        assert!(fields.contains(&"destination"));
        assert!(fields.contains(&"amount"));
        assert!(fields.contains(&"source_tag"));
    }

    #[tokio::test]
    async fn master_disabled_is_a_single_issue() {
        let (_l, v, mut ctx) = setup();
        ctx.flags.disable_master = true;
        let issues = v.validate(&payment(addr(2), "10"), &ctx).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("master key"));
    }

    #[tokio::test]
    async fn missing_ticket_is_named() {
        let (_l, v, mut ctx) = setup();
        ctx.tickets = Some(vec![3, 4]);
        let issues = v
            .validate(&payment(addr(2), "10").with_ticket("7"), &ctx)
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("ticket 7"));
    }

    #[tokio::test]
    async fn destination_tag_requirement_checked_on_ledger() {
        let (ledger, v, ctx) = setup();
        ledger.set_flag(&AccountId::from_bytes([2; 20]), AccountFlag::RequireDestTag, true);
        let issues = v.validate(&payment(addr(2), "10"), &ctx).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "destination_tag");

        let mut tagged = payment(addr(2), "10");
        if let OperationBody::Payment {
            destination_tag, ..
        } = &mut tagged.operation
        {
            *destination_tag = Some("42".into());
        }
        assert!(v.validate(&tagged, &ctx).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unfunded_destination_needs_base_reserve() {
        let (_l, v, ctx) = setup();
        let issues = v.validate(&payment(addr(9), "0.5"), &ctx).await.unwrap();
        assert_eq!(issues[0].field, "amount");
        assert!(v.validate(&payment(addr(9), "1"), &ctx).await.unwrap().is_empty());
    }

    #[test]
    fn transfer_fee_without_transferable_is_flagged() {
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        let draft = OperationDraft::new(
            addr(1),
            OperationBody::NFTokenMint {
                taxon: "0".into(),
                uri: None,
                transfer_fee: Some("100".into()),
                transferable: false,
            },
            master(),
        );
        let issues = PreflightValidator::validate_local(&draft, &ctx);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, "transfer_fee");
    }

    #[test]
    fn signer_list_quorum_must_be_reachable() {
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        let draft = OperationDraft::new(
            addr(1),
            OperationBody::SignerListSet {
                quorum: "5".into(),
                signers: vec![
                    crate::transaction::draft::SignerEntryInput {
                        account: addr(2),
                        weight: "2".into(),
                    },
                    crate::transaction::draft::SignerEntryInput {
                        account: addr(3),
                        weight: "2".into(),
                    },
                ],
            },
            master(),
        );
        let issues = PreflightValidator::validate_local(&draft, &ctx);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains("quorum 5"));
    }
}
