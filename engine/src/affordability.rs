//! # Affordability
//!
//! Local guard run after the build and before signing: the acting account
//! must keep `reserve_base + reserve_increment * owned_objects` after paying
//! the fee and any native value leaving it.
//!
//! The comparison is boundary-inclusive: a balance exactly equal to
//! `reserve + fee + outflow` is affordable, one drop less is not.
//!
//! `owned_objects` is the count *after* the operation applies, so creating
//! a trust line, escrow, offer, signer list, NFT page or tickets raises the
//! bar, and consuming a ticket lowers it.
//!
//! For issued currency the native check covers the fee only and a trust
//! line check covers the value: the account must hold enough of the
//! currency unless it is the issuer.

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::crypto::address::AccountId;
use crate::ledger::client::ReserveInfo;
use crate::ledger::context::LedgerContext;
use crate::transaction::builder::{CanonicalOperation, OperationFields};
use crate::transaction::types::{Amount, CurrencyCode, Drops, IssuedAmount, IssuedValue};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AffordabilityError {
    #[error(
        "balance {balance} cannot cover fee {fee} and {outflow} while keeping the reserve of {reserve} for {owned} owned objects"
    )]
    BelowReserve {
        balance: Drops,
        fee: Drops,
        outflow: Drops,
        reserve: Drops,
        owned: u32,
    },

    #[error("no {currency} trust line with issuer {issuer}")]
    NoTrustLine {
        currency: CurrencyCode,
        issuer: AccountId,
    },

    #[error("holding {available} {currency} from {issuer}, {required} needed")]
    InsufficientLine {
        currency: CurrencyCode,
        issuer: AccountId,
        available: IssuedValue,
        required: IssuedValue,
    },

    #[error("reserve computation overflowed")]
    Overflow,
}

/// What the check saw, for logging and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AffordabilityReport {
    pub balance: Drops,
    pub required: Drops,
    pub owned_after: u32,
}

impl AffordabilityReport {
    pub fn headroom(&self) -> Drops {
        self.balance.checked_sub(self.required).unwrap_or(Drops::ZERO)
    }
}

/// Signed change in owned objects when `op` applies.
pub fn owned_object_delta(op: &CanonicalOperation, ctx: &LedgerContext) -> i64 {
    let created: i64 = match op.fields() {
        OperationFields::TrustSet { limit_amount } => {
            let exists = ctx.trust_lines.as_ref().is_some_and(|lines| {
                lines
                    .iter()
                    .any(|l| l.peer == limit_amount.issuer && l.currency == limit_amount.currency)
            });
            i64::from(!exists)
        }
        OperationFields::EscrowCreate { .. }
        | OperationFields::OfferCreate { .. }
        | OperationFields::NFTokenMint { .. } => 1,
        OperationFields::SignerListSet { .. } => i64::from(ctx.signers().is_none()),
        OperationFields::TicketCreate { ticket_count } => i64::from(*ticket_count),
        _ => 0,
    };
    let consumed = i64::from(op.ticket_sequence().is_some());
    created - consumed
}

/// `balance >= reserve(owned) + fee + outflow`.
pub fn is_affordable(
    balance: Drops,
    owned: u32,
    reserves: &ReserveInfo,
    fee: Drops,
    outflow: Drops,
) -> bool {
    required_balance(owned, reserves, fee, outflow).is_some_and(|need| balance >= need)
}

fn required_balance(owned: u32, reserves: &ReserveInfo, fee: Drops, outflow: Drops) -> Option<Drops> {
    reserves
        .required(owned)?
        .checked_add(fee)?
        .checked_add(outflow)
}

/// Issued value the account must already hold for `op` to apply.
fn issued_outflow(op: &CanonicalOperation) -> Option<&IssuedAmount> {
    match op.fields() {
        OperationFields::Payment {
            amount: Amount::Issued(issued),
            ..
        } => Some(issued),
        OperationFields::OfferCreate {
            taker_gets: Amount::Issued(issued),
            ..
        } => Some(issued),
        _ => None,
    }
}

pub struct AffordabilityChecker;

impl AffordabilityChecker {
    pub fn check(
        op: &CanonicalOperation,
        ctx: &LedgerContext,
    ) -> Result<AffordabilityReport, AffordabilityError> {
        let owned_after = (i64::from(ctx.owner_count) + owned_object_delta(op, ctx)).max(0);
        let owned_after = u32::try_from(owned_after).map_err(|_| AffordabilityError::Overflow)?;
        let outflow = op.native_outflow();

        let required = required_balance(owned_after, &ctx.reserves, op.fee(), outflow)
            .ok_or(AffordabilityError::Overflow)?;
        if ctx.balance < required {
            return Err(AffordabilityError::BelowReserve {
                balance: ctx.balance,
                fee: op.fee(),
                outflow,
                reserve: ctx
                    .reserves
                    .required(owned_after)
                    .ok_or(AffordabilityError::Overflow)?,
                owned: owned_after,
            });
        }

        if let Some(issued) = issued_outflow(op) {
            if issued.issuer != ctx.account {
                Self::check_line(issued, ctx)?;
            }
        }

        let report = AffordabilityReport {
            balance: ctx.balance,
            required,
            owned_after,
        };
        debug!(
            account = %ctx.account,
            required = required.0,
            headroom = report.headroom().0,
            owned_after,
            "affordability passed"
        );
        Ok(report)
    }

    fn check_line(issued: &IssuedAmount, ctx: &LedgerContext) -> Result<(), AffordabilityError> {
        let line = ctx
            .trust_lines
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|l| l.peer == issued.issuer && l.currency == issued.currency)
            .ok_or_else(|| AffordabilityError::NoTrustLine {
                currency: issued.currency.clone(),
                issuer: issued.issuer,
            })?;
        if line.balance < issued.value {
            return Err(AffordabilityError::InsufficientLine {
                currency: issued.currency.clone(),
                issuer: issued.issuer,
                available: line.balance,
                required: issued.value,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::ledger::client::TrustLine;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::draft::{AmountInput, OperationBody, OperationDraft, SigningPreference};

    fn account() -> AccountId {
        AccountId::from_bytes([1; 20])
    }

    fn build(ctx: &LedgerContext, body: OperationBody) -> CanonicalOperation {
        let draft = OperationDraft::new(
            account().to_address(),
            body,
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        );
        TransactionBuilder::new(&draft, ctx).build().unwrap()
    }

    fn pay(drops: u64) -> OperationBody {
        OperationBody::Payment {
            destination: AccountId::from_bytes([2; 20]).to_address(),
            amount: AmountInput::native(format!("{}.{:06}", drops / 1_000_000, drops % 1_000_000)),
            destination_tag: None,
        }
    }

    #[test]
    fn boundary_is_inclusive() {
        let mut ctx = LedgerContext::for_tests(account());
        ctx.owner_count = 2;
        let reserve = ctx.reserves.required(2).unwrap();
        let op = build(&ctx, pay(5_000_000));
        let exact = reserve.0 + op.fee().0 + 5_000_000;

        ctx.balance = Drops(exact);
        let report = AffordabilityChecker::check(&op, &ctx).unwrap();
        assert_eq!(report.headroom(), Drops::ZERO);

        ctx.balance = Drops(exact - 1);
        assert!(matches!(
            AffordabilityChecker::check(&op, &ctx),
            Err(AffordabilityError::BelowReserve { .. })
        ));
    }

    #[test]
    fn new_objects_raise_the_reserve() {
        let mut ctx = LedgerContext::for_tests(account());
        let op = build(&ctx, OperationBody::TicketCreate { count: "3".into() });
        assert_eq!(owned_object_delta(&op, &ctx), 3);

        ctx.balance = Drops(ctx.reserves.required(3).unwrap().0 + op.fee().0 - 1);
        assert!(AffordabilityChecker::check(&op, &ctx).is_err());
    }

    #[test]
    fn consuming_a_ticket_frees_one_object() {
        let mut ctx = LedgerContext::for_tests(account());
        ctx.tickets = Some(vec![5]);
        ctx.owner_count = 1;
        let draft = OperationDraft::new(
            account().to_address(),
            OperationBody::OfferCancel {
                offer_sequence: "2".into(),
            },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        )
        .with_ticket("5");
        let op = TransactionBuilder::new(&draft, &ctx).build().unwrap();
        assert_eq!(owned_object_delta(&op, &ctx), -1);
    }

    #[test]
    fn issued_payment_needs_line_balance() {
        let issuer = AccountId::from_bytes([7; 20]);
        let mut ctx = LedgerContext::for_tests(account());
        let body = OperationBody::Payment {
            destination: AccountId::from_bytes([2; 20]).to_address(),
            amount: AmountInput::issued("10", "USD", issuer.to_address()),
            destination_tag: None,
        };
        let op = build(&ctx, body);

        ctx.trust_lines = Some(Vec::new());
        assert!(matches!(
            AffordabilityChecker::check(&op, &ctx),
            Err(AffordabilityError::NoTrustLine { .. })
        ));

        let usd = CurrencyCode::parse("USD").unwrap();
        ctx.trust_lines = Some(vec![TrustLine {
            peer: issuer,
            currency: usd.clone(),
            balance: IssuedValue::parse("9.5").unwrap(),
            limit: IssuedValue::parse("100").unwrap(),
        }]);
        assert!(matches!(
            AffordabilityChecker::check(&op, &ctx),
            Err(AffordabilityError::InsufficientLine { .. })
        ));

        ctx.trust_lines = Some(vec![TrustLine {
            peer: issuer,
            currency: usd,
            balance: IssuedValue::parse("10").unwrap(),
            limit: IssuedValue::parse("100").unwrap(),
        }]);
        assert!(AffordabilityChecker::check(&op, &ctx).is_ok());
    }

    #[test]
    fn issuer_does_not_need_a_line() {
        let mut ctx = LedgerContext::for_tests(account());
        ctx.trust_lines = Some(Vec::new());
        let body = OperationBody::Payment {
            destination: AccountId::from_bytes([2; 20]).to_address(),
            amount: AmountInput::issued("10", "USD", account().to_address()),
            destination_tag: None,
        };
        let op = build(&ctx, body);
        assert!(AffordabilityChecker::check(&op, &ctx).is_ok());
    }
}
