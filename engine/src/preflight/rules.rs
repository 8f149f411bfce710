//! The per-kind rule table.
//!
//! Every rule is an independent predicate returning `None` or one issue.
//! Rules never short-circuit each other; the validator runs all of them.
//! Synchronous rules only look at the draft and the fetched context.
//! Asynchronous rules need a ledger read and are listed as [`AsyncRule`].

use std::collections::HashSet;

use super::ValidationIssue;
use crate::config::{
    MAX_DOMAIN_BYTES, MAX_MEMO_BYTES, MAX_NFT_TRANSFER_FEE, MAX_SIGNERS, MAX_TICKETS_PER_CREATE,
    MAX_URI_BYTES,
};
use crate::ledger::context::LedgerContext;
use crate::transaction::builder::{bounded_hex, parse_token_id, parse_transfer_rate};
use crate::transaction::draft::{
    parse_address, parse_optional_u32, parse_u32_in, AmountInput, OperationBody, OperationDraft,
    SigningPreference,
};
use crate::transaction::types::{AccountFlag, Amount, Drops, FieldError, OperationKind};

/// A synchronous check.
pub struct SyncRule {
    pub name: &'static str,
    pub check: fn(&OperationDraft, &LedgerContext) -> Option<ValidationIssue>,
}

/// A check that needs a ledger read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncRule {
    /// The destination's tag requirement and existence.
    DestinationRequirements,
    /// The issuer of a trust line limit exists.
    IssuerExists,
}

/// Rules for one operation kind.
pub struct RuleSet {
    pub sync: &'static [SyncRule],
    pub deferred: &'static [AsyncRule],
}

macro_rules! rule {
    ($f:ident) => {
        SyncRule {
            name: stringify!($f),
            check: $f,
        }
    };
}

/// Rules every draft is subject to.
pub static COMMON: &[SyncRule] = &[
    rule!(account_address),
    rule!(master_key_usable),
    rule!(signing_path_available),
    rule!(ticket_exists),
    rule!(source_tag),
    rule!(memo_size),
];

static PAYMENT: &[SyncRule] = &[
    rule!(payment_destination),
    rule!(payment_not_to_self),
    rule!(payment_amount),
    rule!(destination_tag),
];
static TRUST_SET: &[SyncRule] = &[rule!(trust_limit), rule!(trust_issuer_not_self)];
static ESCROW_CREATE: &[SyncRule] = &[
    rule!(escrow_destination),
    rule!(escrow_amount),
    rule!(escrow_times),
    rule!(destination_tag),
];
static ESCROW_RESOLVE: &[SyncRule] = &[rule!(escrow_owner), rule!(offer_sequence)];
static OFFER_CREATE: &[SyncRule] = &[rule!(offer_amounts), rule!(offer_expiration)];
static OFFER_CANCEL: &[SyncRule] = &[rule!(offer_sequence)];
static ACCOUNT_SET: &[SyncRule] = &[
    rule!(account_set_flags),
    rule!(account_set_domain),
    rule!(account_set_transfer_rate),
    rule!(disable_master_has_alternative),
];
static SET_REGULAR_KEY: &[SyncRule] = &[rule!(regular_key_address)];
static SIGNER_LIST_SET: &[SyncRule] = &[
    rule!(signer_list_quorum),
    rule!(signer_list_entries),
    rule!(signer_list_reachable),
];
static TICKET_CREATE: &[SyncRule] = &[rule!(ticket_count)];
static NFT_MINT: &[SyncRule] = &[
    rule!(nft_taxon),
    rule!(nft_uri),
    rule!(nft_transfer_fee),
];
static NFT_BURN: &[SyncRule] = &[rule!(nft_token_id)];

/// The table: operation kind to its rules.
pub fn rules_for(kind: OperationKind) -> RuleSet {
    use AsyncRule::*;
    let (sync, deferred): (&'static [SyncRule], &'static [AsyncRule]) = match kind {
        OperationKind::Payment => (PAYMENT, &[DestinationRequirements]),
        OperationKind::TrustSet => (TRUST_SET, &[IssuerExists]),
        OperationKind::EscrowCreate => (ESCROW_CREATE, &[DestinationRequirements]),
        OperationKind::EscrowFinish | OperationKind::EscrowCancel => (ESCROW_RESOLVE, &[]),
        OperationKind::OfferCreate => (OFFER_CREATE, &[]),
        OperationKind::OfferCancel => (OFFER_CANCEL, &[]),
        OperationKind::AccountSet => (ACCOUNT_SET, &[]),
        OperationKind::SetRegularKey => (SET_REGULAR_KEY, &[]),
        OperationKind::SignerListSet => (SIGNER_LIST_SET, &[]),
        OperationKind::TicketCreate => (TICKET_CREATE, &[]),
        OperationKind::NFTokenMint => (NFT_MINT, &[]),
        OperationKind::NFTokenBurn => (NFT_BURN, &[]),
    };
    RuleSet { sync, deferred }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn field<T>(name: &str, result: Result<T, FieldError>) -> Option<ValidationIssue> {
    result.err().map(|e| ValidationIssue::field(name, &e))
}

fn positive(name: &str, input: &AmountInput) -> Option<ValidationIssue> {
    match input.parse() {
        Err(e) => Some(ValidationIssue::field(name, &e)),
        Ok(amount) if amount.is_zero() => Some(ValidationIssue::new(
            name,
            format!("{name} must be greater than zero"),
        )),
        Ok(_) => None,
    }
}

// ---------------------------------------------------------------------------
// Common rules
// ---------------------------------------------------------------------------

fn account_address(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    field("account", parse_address(&d.account))
}

fn master_key_usable(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    (ctx.flags.disable_master && d.signing.is_master()).then(|| {
        ValidationIssue::new(
            "signing",
            "the master key is disabled for this account; sign with the regular key or the signer list",
        )
    })
}

fn signing_path_available(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    match &d.signing {
        SigningPreference::Master { .. } => None,
        SigningPreference::RegularKey { .. } => ctx
            .regular_key
            .is_none()
            .then(|| ValidationIssue::new("signing", "the account has no regular key set")),
        SigningPreference::MultiSign { signers } => {
            if signers.is_empty() {
                Some(ValidationIssue::new("signing", "at least one signer is required"))
            } else if matches!(ctx.signer_list, Some(None)) {
                Some(ValidationIssue::new("signing", "the account has no signer list"))
            } else {
                None
            }
        }
    }
}

fn ticket_exists(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    let raw = d.ticket.as_deref().map(str::trim).filter(|t| !t.is_empty())?;
    match parse_u32_in(raw, 1, u32::MAX) {
        Err(e) => Some(ValidationIssue::field("ticket", &e)),
        Ok(t) if !ctx.has_ticket(t) => Some(ValidationIssue::new(
            "ticket",
            format!("ticket {t} does not exist on the account"),
        )),
        Ok(_) => None,
    }
}

fn source_tag(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    field("source_tag", parse_optional_u32(d.source_tag.as_deref()))
}

fn memo_size(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    let total: usize = d
        .memos
        .iter()
        .map(|m| {
            m.data.len()
                + m.memo_type.as_deref().map_or(0, str::len)
                + m.format.as_deref().map_or(0, str::len)
        })
        .sum();
    (total > MAX_MEMO_BYTES)
        .then(|| ValidationIssue::field("memos", &FieldError::TooLong { max: MAX_MEMO_BYTES }))
}

// ---------------------------------------------------------------------------
// Payment
// ---------------------------------------------------------------------------

fn payment_destination(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::Payment { destination, .. } => field("destination", parse_address(destination)),
        _ => None,
    }
}

fn payment_not_to_self(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::Payment { destination, .. } => parse_address(destination)
            .ok()
            .filter(|dest| *dest == ctx.account)
            .map(|_| ValidationIssue::new("destination", "cannot send to the sending account")),
        _ => None,
    }
}

fn payment_amount(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::Payment { amount, .. } => positive("amount", amount),
        _ => None,
    }
}

fn destination_tag(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::Payment {
            destination_tag, ..
        }
        | OperationBody::EscrowCreate {
            destination_tag, ..
        } => field("destination_tag", parse_optional_u32(destination_tag.as_deref())),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// TrustSet
// ---------------------------------------------------------------------------

fn trust_limit(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::TrustSet { limit } if limit.is_native() => Some(ValidationIssue::new(
            "limit",
            "a trust line limit needs an issued currency",
        )),
        OperationBody::TrustSet { limit } => field("limit", limit.parse_issued()),
        _ => None,
    }
}

fn trust_issuer_not_self(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::TrustSet { limit } => limit
            .parse_issued()
            .ok()
            .filter(|a| a.issuer == ctx.account)
            .map(|_| ValidationIssue::new("limit", "cannot set a trust line to the sending account")),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Escrow
// ---------------------------------------------------------------------------

fn escrow_destination(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::EscrowCreate { destination, .. } => {
            field("destination", parse_address(destination))
        }
        _ => None,
    }
}

fn escrow_amount(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::EscrowCreate { amount, .. } => match Drops::parse_coins(amount) {
            Err(e) => Some(ValidationIssue::field("amount", &e)),
            Ok(drops) if drops.is_zero() => Some(ValidationIssue::new(
                "amount",
                "amount must be greater than zero",
            )),
            Ok(_) => None,
        },
        _ => None,
    }
}

fn escrow_times(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::EscrowCreate {
        finish_after,
        cancel_after,
        ..
    } = &d.operation
    else {
        return None;
    };
    let finish = match parse_optional_u32(finish_after.as_deref()) {
        Ok(v) => v.filter(|s| *s > 0),
        Err(e) => return Some(ValidationIssue::field("finish_after", &e)),
    };
    let cancel = match parse_optional_u32(cancel_after.as_deref()) {
        Ok(v) => v.filter(|s| *s > 0),
        Err(e) => return Some(ValidationIssue::field("cancel_after", &e)),
    };
    match (finish, cancel) {
        (None, None) => Some(ValidationIssue::new(
            "finish_after",
            "an escrow needs a finish time, a cancel time, or both",
        )),
        (Some(f), Some(c)) if c <= f => Some(ValidationIssue::new(
            "cancel_after",
            "cancel time must be after the finish time",
        )),
        _ => None,
    }
}

fn escrow_owner(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::EscrowFinish { owner, .. } | OperationBody::EscrowCancel { owner, .. } => {
            field("owner", parse_address(owner))
        }
        _ => None,
    }
}

fn offer_sequence(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::EscrowFinish { offer_sequence, .. }
        | OperationBody::EscrowCancel { offer_sequence, .. }
        | OperationBody::OfferCancel { offer_sequence } => {
            field("offer_sequence", parse_u32_in(offer_sequence, 1, u32::MAX))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Offers
// ---------------------------------------------------------------------------

fn offer_amounts(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::OfferCreate {
        taker_pays,
        taker_gets,
        ..
    } = &d.operation
    else {
        return None;
    };
    if let Some(issue) = positive("taker_pays", taker_pays) {
        return Some(issue);
    }
    if let Some(issue) = positive("taker_gets", taker_gets) {
        return Some(issue);
    }
    match (taker_pays.parse(), taker_gets.parse()) {
        (Ok(Amount::Native(_)), Ok(Amount::Native(_))) => Some(ValidationIssue::new(
            "taker_pays",
            "an offer cannot trade the native currency for itself",
        )),
        _ => None,
    }
}

fn offer_expiration(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::OfferCreate { expiration, .. } => {
            field("expiration", parse_optional_u32(expiration.as_deref()))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Account configuration
// ---------------------------------------------------------------------------

fn account_set_flags(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::AccountSet {
            set_flag: Some(s),
            clear_flag: Some(c),
            ..
        } if s == c => Some(ValidationIssue::new(
            "clear_flag",
            "cannot set and clear the same flag",
        )),
        _ => None,
    }
}

fn account_set_domain(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::AccountSet { domain, .. } => {
            field("domain", bounded_hex(domain.as_deref(), MAX_DOMAIN_BYTES))
        }
        _ => None,
    }
}

fn account_set_transfer_rate(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::AccountSet { transfer_rate, .. } => {
            field("transfer_rate", parse_transfer_rate(transfer_rate.as_deref()))
        }
        _ => None,
    }
}

fn disable_master_has_alternative(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::AccountSet {
            set_flag: Some(AccountFlag::DisableMaster),
            ..
        } if ctx.regular_key.is_none() && ctx.signers().is_none() => Some(ValidationIssue::new(
            "set_flag",
            "set a regular key or a signer list before disabling the master key",
        )),
        _ => None,
    }
}

fn regular_key_address(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::SetRegularKey { regular_key } = &d.operation else {
        return None;
    };
    let raw = regular_key.as_deref().map(str::trim).filter(|k| !k.is_empty())?;
    match parse_address(raw) {
        Err(e) => Some(ValidationIssue::field("regular_key", &e)),
        Ok(key) if key == ctx.account => Some(ValidationIssue::new(
            "regular_key",
            "the regular key cannot be the account's own master key",
        )),
        Ok(_) => None,
    }
}

fn signer_list_quorum(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::SignerListSet { quorum, .. } => {
            field("quorum", parse_u32_in(quorum, 1, u32::MAX))
        }
        _ => None,
    }
}

fn signer_list_entries(d: &OperationDraft, ctx: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::SignerListSet { signers, .. } = &d.operation else {
        return None;
    };
    if signers.is_empty() || signers.len() > MAX_SIGNERS {
        return Some(ValidationIssue::field(
            "signers",
            &FieldError::OutOfRange {
                min: 1,
                max: MAX_SIGNERS as u64,
            },
        ));
    }
    let mut seen = HashSet::new();
    for entry in signers {
        let account = match parse_address(&entry.account) {
            Ok(a) => a,
            Err(e) => return Some(ValidationIssue::field("signers", &e)),
        };
        if account == ctx.account {
            return Some(ValidationIssue::new(
                "signers",
                "the account cannot be its own signer",
            ));
        }
        if !seen.insert(account) {
            return Some(ValidationIssue::new(
                "signers",
                format!("signer {account} is listed more than once"),
            ));
        }
        if let Err(e) = parse_u32_in(&entry.weight, 1, u16::MAX as u32) {
            return Some(ValidationIssue::new(
                "signers",
                format!("weight of {account} {e}"),
            ));
        }
    }
    None
}

fn signer_list_reachable(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::SignerListSet { quorum, signers } = &d.operation else {
        return None;
    };
    let quorum = parse_u32_in(quorum, 1, u32::MAX).ok()?;
    let total: u64 = signers
        .iter()
        .filter_map(|s| parse_u32_in(&s.weight, 1, u16::MAX as u32).ok())
        .map(u64::from)
        .sum();
    (quorum as u64 > total).then(|| {
        ValidationIssue::new(
            "quorum",
            format!("quorum {quorum} exceeds the total signer weight {total}"),
        )
    })
}

fn ticket_count(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::TicketCreate { count } => {
            field("count", parse_u32_in(count, 1, MAX_TICKETS_PER_CREATE))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// NFTs
// ---------------------------------------------------------------------------

fn nft_taxon(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::NFTokenMint { taxon, .. } => field("taxon", parse_u32_in(taxon, 0, u32::MAX)),
        _ => None,
    }
}

fn nft_uri(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::NFTokenMint { uri, .. } => field("uri", bounded_hex(uri.as_deref(), MAX_URI_BYTES)),
        _ => None,
    }
}

fn nft_transfer_fee(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    let OperationBody::NFTokenMint {
        transfer_fee,
        transferable,
        ..
    } = &d.operation
    else {
        return None;
    };
    match parse_optional_u32(transfer_fee.as_deref()) {
        Err(e) => Some(ValidationIssue::field("transfer_fee", &e)),
        Ok(Some(fee)) if fee > MAX_NFT_TRANSFER_FEE as u32 => Some(ValidationIssue::field(
            "transfer_fee",
            &FieldError::OutOfRange {
                min: 0,
                max: MAX_NFT_TRANSFER_FEE as u64,
            },
        )),
        Ok(Some(fee)) if fee > 0 && !transferable => Some(ValidationIssue::new(
            "transfer_fee",
            "a transfer fee requires the transferable flag",
        )),
        _ => None,
    }
}

fn nft_token_id(d: &OperationDraft, _: &LedgerContext) -> Option<ValidationIssue> {
    match &d.operation {
        OperationBody::NFTokenBurn { token_id } => field("token_id", parse_token_id(token_id)),
        _ => None,
    }
}
