//! Canonical operation construction.
//!
//! The [`TransactionBuilder`] turns an [`OperationDraft`] plus a fresh
//! [`LedgerContext`] into a [`CanonicalOperation`]: every field normalized,
//! exactly one of sequence/ticket consumed, fee and expiration set.
//!
//! A `CanonicalOperation` has no setters. Once built it is never touched
//! field-by-field again; a retry builds a new one from a new context.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::draft::{
    parse_address, parse_optional_u32, parse_u32_in, MemoInput, OperationBody, OperationDraft,
};
use super::types::{
    text_to_hex, Amount, Drops, FieldError, IssuedAmount, Memo, OperationKind, SignerEntry,
};
use crate::config::{
    LEDGER_OFFSET, MAX_DOMAIN_BYTES, MAX_NFT_TRANSFER_FEE, MAX_SIGNERS, MAX_TICKETS_PER_CREATE,
    MAX_URI_BYTES, RIPPLE_EPOCH_OFFSET, SEQUENCE_UNUSED, TRANSFER_RATE_MAX, TRANSFER_RATE_MIN,
};
use crate::crypto::address::AccountId;
use crate::ledger::context::LedgerContext;

/// `NFTokenMint` flag allowing the token to be sold to third parties.
pub const NFT_FLAG_TRANSFERABLE: u32 = 0x0000_0008;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a draft could not be turned into a canonical operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("{field} {error}")]
    InvalidField {
        field: &'static str,
        error: FieldError,
    },

    #[error("ticket {0} does not exist on the account")]
    TicketNotFound(u32),

    #[error("transfer fee requires the transferable flag")]
    TransferFeeWithoutTransferable,

    #[error("fee overflow for {0} signers")]
    FeeOverflow(u64),

    #[error("{0} overflows the ledger's 32-bit range")]
    Overflow(&'static str),
}

impl BuildError {
    /// Name of the draft field the error refers to.
    pub fn field(&self) -> &'static str {
        match self {
            Self::InvalidField { field, .. } => field,
            Self::TicketNotFound(_) => "ticket",
            Self::TransferFeeWithoutTransferable => "transfer_fee",
            Self::FeeOverflow(_) => "fee",
            Self::Overflow(field) => field,
        }
    }
}

fn field_err(field: &'static str) -> impl Fn(FieldError) -> BuildError {
    move |error| BuildError::InvalidField { field, error }
}

// ---------------------------------------------------------------------------
// Sequencing
// ---------------------------------------------------------------------------

/// Which one-shot counter an operation consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequencing {
    /// The account's current sequence number.
    Sequence(u32),
    /// A previously created ticket.
    Ticket(u32),
}

// ---------------------------------------------------------------------------
// OperationFields
// ---------------------------------------------------------------------------

/// Normalized, operation-specific fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "TransactionType")]
pub enum OperationFields {
    #[serde(rename_all = "PascalCase")]
    Payment {
        destination: AccountId,
        amount: Amount,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination_tag: Option<u32>,
    },
    #[serde(rename_all = "PascalCase")]
    TrustSet { limit_amount: IssuedAmount },
    #[serde(rename_all = "PascalCase")]
    EscrowCreate {
        destination: AccountId,
        amount: Drops,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_after: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cancel_after: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination_tag: Option<u32>,
    },
    #[serde(rename_all = "PascalCase")]
    EscrowFinish { owner: AccountId, offer_sequence: u32 },
    #[serde(rename_all = "PascalCase")]
    EscrowCancel { owner: AccountId, offer_sequence: u32 },
    #[serde(rename_all = "PascalCase")]
    OfferCreate {
        taker_pays: Amount,
        taker_gets: Amount,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expiration: Option<u32>,
    },
    #[serde(rename_all = "PascalCase")]
    OfferCancel { offer_sequence: u32 },
    #[serde(rename_all = "PascalCase")]
    AccountSet {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        set_flag: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clear_flag: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        domain: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transfer_rate: Option<u32>,
    },
    #[serde(rename_all = "PascalCase")]
    SetRegularKey {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        regular_key: Option<AccountId>,
    },
    #[serde(rename_all = "PascalCase")]
    SignerListSet {
        signer_quorum: u32,
        signer_entries: Vec<SignerEntry>,
    },
    #[serde(rename_all = "PascalCase")]
    TicketCreate { ticket_count: u32 },
    NFTokenMint {
        #[serde(rename = "NFTokenTaxon")]
        taxon: u32,
        #[serde(rename = "URI", default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
        #[serde(rename = "TransferFee", default, skip_serializing_if = "Option::is_none")]
        transfer_fee: Option<u16>,
        #[serde(rename = "Flags", default)]
        flags: u32,
    },
    NFTokenBurn {
        #[serde(rename = "NFTokenID")]
        token_id: String,
    },
}

impl OperationFields {
    pub fn kind(&self) -> OperationKind {
        match self {
            Self::Payment { .. } => OperationKind::Payment,
            Self::TrustSet { .. } => OperationKind::TrustSet,
            Self::EscrowCreate { .. } => OperationKind::EscrowCreate,
            Self::EscrowFinish { .. } => OperationKind::EscrowFinish,
            Self::EscrowCancel { .. } => OperationKind::EscrowCancel,
            Self::OfferCreate { .. } => OperationKind::OfferCreate,
            Self::OfferCancel { .. } => OperationKind::OfferCancel,
            Self::AccountSet { .. } => OperationKind::AccountSet,
            Self::SetRegularKey { .. } => OperationKind::SetRegularKey,
            Self::SignerListSet { .. } => OperationKind::SignerListSet,
            Self::TicketCreate { .. } => OperationKind::TicketCreate,
            Self::NFTokenMint { .. } => OperationKind::NFTokenMint,
            Self::NFTokenBurn { .. } => OperationKind::NFTokenBurn,
        }
    }
}

// ---------------------------------------------------------------------------
// CanonicalOperation
// ---------------------------------------------------------------------------

/// A fully populated, unsigned ledger operation.
///
/// `sequence` and `ticket_sequence` are only ever set together through
/// [`Sequencing`]: a ticket forces `sequence` to the unused sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CanonicalOperation {
    account: AccountId,
    fee: Drops,
    sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ticket_sequence: Option<u32>,
    last_ledger_sequence: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_tag: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    memos: Vec<Memo>,
    #[serde(flatten)]
    fields: OperationFields,
}

impl CanonicalOperation {
    pub fn account(&self) -> AccountId {
        self.account
    }

    pub fn kind(&self) -> OperationKind {
        self.fields.kind()
    }

    pub fn fee(&self) -> Drops {
        self.fee
    }

    /// The `Sequence` field as it goes on the wire (0 when a ticket is used).
    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn ticket_sequence(&self) -> Option<u32> {
        self.ticket_sequence
    }

    /// Which counter this operation consumes. `None` if a decoded operation
    /// sets both or neither, which the ledger treats as malformed.
    pub fn sequencing(&self) -> Option<Sequencing> {
        match (self.sequence, self.ticket_sequence) {
            (SEQUENCE_UNUSED, Some(t)) => Some(Sequencing::Ticket(t)),
            (s, None) if s != SEQUENCE_UNUSED => Some(Sequencing::Sequence(s)),
            _ => None,
        }
    }

    pub fn last_ledger_sequence(&self) -> u32 {
        self.last_ledger_sequence
    }

    pub fn source_tag(&self) -> Option<u32> {
        self.source_tag
    }

    pub fn memos(&self) -> &[Memo] {
        &self.memos
    }

    pub fn fields(&self) -> &OperationFields {
        &self.fields
    }

    /// Native value that leaves the account when this operation applies,
    /// excluding the fee.
    pub fn native_outflow(&self) -> Drops {
        match &self.fields {
            OperationFields::Payment { amount, .. } => amount.native_drops(),
            OperationFields::EscrowCreate { amount, .. } => *amount,
            _ => Drops::ZERO,
        }
    }

    /// Counterparty receiving value, where there is one.
    pub fn destination(&self) -> Option<AccountId> {
        match &self.fields {
            OperationFields::Payment { destination, .. }
            | OperationFields::EscrowCreate { destination, .. } => Some(*destination),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// TransactionBuilder
// ---------------------------------------------------------------------------

/// Builds a [`CanonicalOperation`] from a draft and a fetched context.
///
/// ```rust,no_run
/// # use ledgerflow::transaction::{TransactionBuilder, OperationDraft};
/// # use ledgerflow::ledger::LedgerContext;
/// # fn demo(draft: &OperationDraft, ctx: &LedgerContext) {
/// let op = TransactionBuilder::new(draft, ctx)
///     .fee_multiplier(3)
///     .build()
///     .unwrap();
/// assert_eq!(op.fee().0, ctx.base_fee.0 * 3);
/// # }
/// ```
pub struct TransactionBuilder<'a> {
    draft: &'a OperationDraft,
    context: &'a LedgerContext,
    fee_multiplier: u64,
    ledger_offset: u32,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(draft: &'a OperationDraft, context: &'a LedgerContext) -> Self {
        Self {
            draft,
            context,
            fee_multiplier: 1,
            ledger_offset: LEDGER_OFFSET,
        }
    }

    /// Scale the base fee, e.g. `signers + 1` for a multi-signed operation.
    pub fn fee_multiplier(mut self, multiplier: u64) -> Self {
        self.fee_multiplier = multiplier.max(1);
        self
    }

    /// Ledgers added to the expiration horizon.
    pub fn ledger_offset(mut self, offset: u32) -> Self {
        self.ledger_offset = offset;
        self
    }

    pub fn build(self) -> Result<CanonicalOperation, BuildError> {
        let ctx = self.context;
        let draft = self.draft;

        let account = parse_address(&draft.account).map_err(field_err("account"))?;

        let (sequence, ticket_sequence) = match self.resolve_sequencing()? {
            Sequencing::Ticket(t) => (SEQUENCE_UNUSED, Some(t)),
            Sequencing::Sequence(s) => (s, None),
        };

        let fee = ctx
            .base_fee
            .checked_mul(self.fee_multiplier)
            .ok_or(BuildError::FeeOverflow(self.fee_multiplier))?;

        let last_ledger_sequence = ctx
            .expiration_horizon
            .checked_add(self.ledger_offset)
            .ok_or(BuildError::Overflow("last_ledger_sequence"))?;

        let source_tag =
            parse_optional_u32(draft.source_tag.as_deref()).map_err(field_err("source_tag"))?;

        let memos = draft.memos.iter().filter_map(normalize_memo).collect();
        let fields = self.build_fields()?;

        Ok(CanonicalOperation {
            account,
            fee,
            sequence,
            ticket_sequence,
            last_ledger_sequence,
            source_tag,
            memos,
            fields,
        })
    }

    fn resolve_sequencing(&self) -> Result<Sequencing, BuildError> {
        let raw = match self.draft.ticket.as_deref().map(str::trim) {
            None | Some("") => return Ok(Sequencing::Sequence(self.context.sequence)),
            Some(raw) => raw,
        };
        let ticket = parse_u32_in(raw, 1, u32::MAX).map_err(field_err("ticket"))?;
        let known = self
            .context
            .tickets
            .as_ref()
            .is_some_and(|tickets| tickets.contains(&ticket));
        if !known {
            return Err(BuildError::TicketNotFound(ticket));
        }
        Ok(Sequencing::Ticket(ticket))
    }

    /// Ledger-epoch time `offset_secs` after the context was fetched.
    fn ledger_time(&self, field: &'static str, raw: Option<&str>) -> Result<Option<u32>, BuildError> {
        let Some(offset) = parse_optional_u32(raw).map_err(field_err(field))? else {
            return Ok(None);
        };
        if offset == 0 {
            return Ok(None);
        }
        let now = self.context.fetched_at.timestamp() - RIPPLE_EPOCH_OFFSET;
        let at = now + offset as i64;
        u32::try_from(at).map(Some).map_err(|_| BuildError::Overflow(field))
    }

    fn build_fields(&self) -> Result<OperationFields, BuildError> {
        let fields = match &self.draft.operation {
            OperationBody::Payment {
                destination,
                amount,
                destination_tag,
            } => OperationFields::Payment {
                destination: parse_address(destination).map_err(field_err("destination"))?,
                amount: amount.parse().map_err(field_err("amount"))?,
                destination_tag: parse_optional_u32(destination_tag.as_deref())
                    .map_err(field_err("destination_tag"))?,
            },

            OperationBody::TrustSet { limit } => OperationFields::TrustSet {
                limit_amount: limit.parse_issued().map_err(field_err("limit"))?,
            },

            OperationBody::EscrowCreate {
                destination,
                amount,
                finish_after,
                cancel_after,
                destination_tag,
            } => OperationFields::EscrowCreate {
                destination: parse_address(destination).map_err(field_err("destination"))?,
                amount: Drops::parse_coins(amount).map_err(field_err("amount"))?,
                finish_after: self.ledger_time("finish_after", finish_after.as_deref())?,
                cancel_after: self.ledger_time("cancel_after", cancel_after.as_deref())?,
                destination_tag: parse_optional_u32(destination_tag.as_deref())
                    .map_err(field_err("destination_tag"))?,
            },

            OperationBody::EscrowFinish {
                owner,
                offer_sequence,
            } => OperationFields::EscrowFinish {
                owner: parse_address(owner).map_err(field_err("owner"))?,
                offer_sequence: parse_u32_in(offer_sequence, 1, u32::MAX)
                    .map_err(field_err("offer_sequence"))?,
            },

            OperationBody::EscrowCancel {
                owner,
                offer_sequence,
            } => OperationFields::EscrowCancel {
                owner: parse_address(owner).map_err(field_err("owner"))?,
                offer_sequence: parse_u32_in(offer_sequence, 1, u32::MAX)
                    .map_err(field_err("offer_sequence"))?,
            },

            OperationBody::OfferCreate {
                taker_pays,
                taker_gets,
                expiration,
            } => OperationFields::OfferCreate {
                taker_pays: taker_pays.parse().map_err(field_err("taker_pays"))?,
                taker_gets: taker_gets.parse().map_err(field_err("taker_gets"))?,
                expiration: self.ledger_time("expiration", expiration.as_deref())?,
            },

            OperationBody::OfferCancel { offer_sequence } => OperationFields::OfferCancel {
                offer_sequence: parse_u32_in(offer_sequence, 1, u32::MAX)
                    .map_err(field_err("offer_sequence"))?,
            },

            OperationBody::AccountSet {
                set_flag,
                clear_flag,
                domain,
                transfer_rate,
            } => OperationFields::AccountSet {
                set_flag: set_flag.map(|f| f.code()),
                clear_flag: clear_flag.map(|f| f.code()),
                domain: bounded_hex(domain.as_deref(), MAX_DOMAIN_BYTES)
                    .map_err(field_err("domain"))?,
                transfer_rate: parse_transfer_rate(transfer_rate.as_deref())
                    .map_err(field_err("transfer_rate"))?,
            },

            OperationBody::SetRegularKey { regular_key } => OperationFields::SetRegularKey {
                regular_key: match regular_key.as_deref().map(str::trim) {
                    None | Some("") => None,
                    Some(raw) => Some(parse_address(raw).map_err(field_err("regular_key"))?),
                },
            },

            OperationBody::SignerListSet { quorum, signers } => {
                let mut entries = signers
                    .iter()
                    .map(|s| {
                        Ok(SignerEntry {
                            account: parse_address(&s.account).map_err(field_err("signers"))?,
                            signer_weight: parse_u32_in(&s.weight, 1, u16::MAX as u32)
                                .map_err(field_err("signers"))?
                                as u16,
                        })
                    })
                    .collect::<Result<Vec<_>, BuildError>>()?;
                if entries.is_empty() || entries.len() > MAX_SIGNERS {
                    return Err(BuildError::InvalidField {
                        field: "signers",
                        error: FieldError::OutOfRange {
                            min: 1,
                            max: MAX_SIGNERS as u64,
                        },
                    });
                }
                entries.sort_by_key(|e| e.account);
                OperationFields::SignerListSet {
                    signer_quorum: parse_u32_in(quorum, 1, u32::MAX)
                        .map_err(field_err("quorum"))?,
                    signer_entries: entries,
                }
            }

            OperationBody::TicketCreate { count } => OperationFields::TicketCreate {
                ticket_count: parse_u32_in(count, 1, MAX_TICKETS_PER_CREATE)
                    .map_err(field_err("count"))?,
            },

            OperationBody::NFTokenMint {
                taxon,
                uri,
                transfer_fee,
                transferable,
            } => {
                let fee = parse_optional_u32(transfer_fee.as_deref())
                    .map_err(field_err("transfer_fee"))?
                    .filter(|f| *f > 0);
                if let Some(fee) = fee {
                    if fee > MAX_NFT_TRANSFER_FEE as u32 {
                        return Err(BuildError::InvalidField {
                            field: "transfer_fee",
                            error: FieldError::OutOfRange {
                                min: 0,
                                max: MAX_NFT_TRANSFER_FEE as u64,
                            },
                        });
                    }
                    if !transferable {
                        return Err(BuildError::TransferFeeWithoutTransferable);
                    }
                }
                OperationFields::NFTokenMint {
                    taxon: parse_u32_in(taxon, 0, u32::MAX).map_err(field_err("taxon"))?,
                    uri: bounded_hex(uri.as_deref(), MAX_URI_BYTES).map_err(field_err("uri"))?,
                    transfer_fee: fee.map(|f| f as u16),
                    flags: if *transferable { NFT_FLAG_TRANSFERABLE } else { 0 },
                }
            }

            OperationBody::NFTokenBurn { token_id } => OperationFields::NFTokenBurn {
                token_id: parse_token_id(token_id).map_err(field_err("token_id"))?,
            },
        };
        Ok(fields)
    }
}

// ---------------------------------------------------------------------------
// Normalization helpers
// ---------------------------------------------------------------------------

/// Hex-encode every present memo field; drop memos that end up empty.
fn normalize_memo(input: &MemoInput) -> Option<Memo> {
    if input.is_empty() {
        return None;
    }
    Some(Memo {
        memo_type: input.memo_type.as_deref().and_then(text_to_hex),
        memo_data: text_to_hex(&input.data),
        memo_format: input.format.as_deref().and_then(text_to_hex),
    })
}

pub(crate) fn bounded_hex(raw: Option<&str>, max: usize) -> Result<Option<String>, FieldError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    if text.len() > max {
        return Err(FieldError::TooLong { max });
    }
    Ok(text_to_hex(text))
}

/// `"1.25"` -> `1_250_000_000`. Blank and `"0"` mean "leave unset".
pub(crate) fn parse_transfer_rate(raw: Option<&str>) -> Result<Option<u32>, FieldError> {
    let Some(text) = raw.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let (whole, frac) = text.split_once('.').unwrap_or((text, ""));
    let digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !digits(whole) || !(frac.is_empty() || digits(frac)) {
        return Err(FieldError::NotANumber(text.to_string()));
    }
    if frac.len() > 9 {
        return Err(FieldError::TooManyDecimals { max: 9 });
    }
    let whole: u64 = whole
        .parse()
        .map_err(|_| FieldError::NotANumber(text.to_string()))?;
    let frac: u64 = format!("{:0<9}", frac)
        .parse()
        .map_err(|_| FieldError::NotANumber(text.to_string()))?;
    let rate = whole.saturating_mul(1_000_000_000).saturating_add(frac);
    if rate == 0 {
        return Ok(None);
    }
    if rate < TRANSFER_RATE_MIN as u64 || rate > TRANSFER_RATE_MAX as u64 {
        return Err(FieldError::OutOfRange {
            min: TRANSFER_RATE_MIN as u64,
            max: TRANSFER_RATE_MAX as u64,
        });
    }
    Ok(Some(rate as u32))
}

pub(crate) fn parse_token_id(raw: &str) -> Result<String, FieldError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(FieldError::Missing);
    }
    if id.len() != 64 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(FieldError::NotANumber(id.to_string()));
    }
    Ok(id.to_ascii_uppercase())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::ledger::context::LedgerContext;
    use crate::transaction::draft::{AmountInput, SignerEntryInput, SigningPreference};
    use chrono::{TimeZone, Utc};

    fn addr(b: u8) -> String {
        AccountId::from_bytes([b; 20]).to_address()
    }

    fn context() -> LedgerContext {
        let mut ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        ctx.sequence = 42;
        ctx.expiration_horizon = 1_000;
        ctx.fetched_at = Utc.timestamp_opt(RIPPLE_EPOCH_OFFSET + 500, 0).unwrap();
        ctx
    }

    fn draft(body: OperationBody) -> OperationDraft {
        OperationDraft::new(
            addr(1),
            body,
            SigningPreference::Master {
                key: KeyHandle::new("alice"),
            },
        )
    }

    fn payment() -> OperationDraft {
        draft(OperationBody::Payment {
            destination: addr(2),
            amount: AmountInput::native("10"),
            destination_tag: None,
        })
    }

    #[test]
    fn uses_account_sequence_without_ticket() {
        let ctx = context();
        let op = TransactionBuilder::new(&payment(), &ctx).build().unwrap();
        assert_eq!(op.sequence(), 42);
        assert_eq!(op.ticket_sequence(), None);
        assert_eq!(op.sequencing(), Some(Sequencing::Sequence(42)));
        assert_eq!(op.last_ledger_sequence(), 1_000 + LEDGER_OFFSET);
        assert_eq!(op.fee(), ctx.base_fee);
        assert_eq!(op.native_outflow(), Drops(10_000_000));
    }

    #[test]
    fn ticket_forces_sequence_sentinel() {
        let mut ctx = context();
        ctx.tickets = Some(vec![5, 7]);
        let op = TransactionBuilder::new(&payment().with_ticket("7"), &ctx)
            .build()
            .unwrap();
        assert_eq!(op.sequence(), SEQUENCE_UNUSED);
        assert_eq!(op.ticket_sequence(), Some(7));
        assert_eq!(op.sequencing(), Some(Sequencing::Ticket(7)));
    }

    #[test]
    fn missing_ticket_is_an_error() {
        let mut ctx = context();
        ctx.tickets = Some(vec![5]);
        let err = TransactionBuilder::new(&payment().with_ticket("7"), &ctx)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::TicketNotFound(7));
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn fee_multiplier_scales_base_fee() {
        let ctx = context();
        for signers in [1u64, 2, 5] {
            let op = TransactionBuilder::new(&payment(), &ctx)
                .fee_multiplier(signers + 1)
                .build()
                .unwrap();
            assert_eq!(op.fee().0, ctx.base_fee.0 * (signers + 1));
        }
    }

    #[test]
    fn empty_optionals_are_omitted() {
        let ctx = context();
        let d = payment()
            .with_memo(MemoInput::default())
            .with_source_tag("");
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("Memos").is_none());
        assert!(json.get("SourceTag").is_none());
        assert!(json.get("TicketSequence").is_none());
        assert!(json.get("DestinationTag").is_none());
        assert_eq!(json["TransactionType"], "Payment");
    }

    #[test]
    fn zero_destination_tag_is_kept() {
        let ctx = context();
        let d = draft(OperationBody::Payment {
            destination: addr(2),
            amount: AmountInput::native("1"),
            destination_tag: Some("0".into()),
        });
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["DestinationTag"], 0);
    }

    #[test]
    fn memo_text_is_hex_encoded() {
        let ctx = context();
        let d = payment().with_memo(MemoInput::text("hi"));
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        assert_eq!(op.memos()[0].memo_data.as_deref(), Some("6869"));
        assert_eq!(op.memos()[0].memo_type, None);
    }

    #[test]
    fn transfer_fee_requires_transferable() {
        let ctx = context();
        let body = |transferable| OperationBody::NFTokenMint {
            taxon: "0".into(),
            uri: None,
            transfer_fee: Some("500".into()),
            transferable,
        };
        let err = TransactionBuilder::new(&draft(body(false)), &ctx)
            .build()
            .unwrap_err();
        assert_eq!(err, BuildError::TransferFeeWithoutTransferable);

        let op = TransactionBuilder::new(&draft(body(true)), &ctx)
            .build()
            .unwrap();
        match op.fields() {
            OperationFields::NFTokenMint {
                transfer_fee, flags, ..
            } => {
                assert_eq!(*transfer_fee, Some(500));
                assert_eq!(*flags, NFT_FLAG_TRANSFERABLE);
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn zero_transfer_fee_is_dropped_not_rejected() {
        let ctx = context();
        let d = draft(OperationBody::NFTokenMint {
            taxon: "1".into(),
            uri: Some("ipfs://x".into()),
            transfer_fee: Some("0".into()),
            transferable: false,
        });
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert!(json.get("TransferFee").is_none());
        assert_eq!(json["URI"], hex::encode_upper("ipfs://x"));
    }

    #[test]
    fn escrow_times_are_ledger_epoch_relative() {
        let ctx = context();
        let d = draft(OperationBody::EscrowCreate {
            destination: addr(2),
            amount: "5".into(),
            finish_after: Some("60".into()),
            cancel_after: Some("0".into()),
            destination_tag: None,
        });
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        match op.fields() {
            OperationFields::EscrowCreate {
                finish_after,
                cancel_after,
                ..
            } => {
                assert_eq!(*finish_after, Some(560));
                assert_eq!(*cancel_after, None);
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn signer_entries_are_sorted() {
        let ctx = context();
        let d = draft(OperationBody::SignerListSet {
            quorum: "2".into(),
            signers: vec![
                SignerEntryInput {
                    account: addr(9),
                    weight: "1".into(),
                },
                SignerEntryInput {
                    account: addr(3),
                    weight: "1".into(),
                },
            ],
        });
        let op = TransactionBuilder::new(&d, &ctx).build().unwrap();
        match op.fields() {
            OperationFields::SignerListSet { signer_entries, .. } => {
                assert!(signer_entries[0].account < signer_entries[1].account);
            }
            other => panic!("unexpected fields {:?}", other),
        }
    }

    #[test]
    fn transfer_rate_parsing() {
        assert_eq!(parse_transfer_rate(Some("1.5")), Ok(Some(1_500_000_000)));
        assert_eq!(parse_transfer_rate(Some("0")), Ok(None));
        assert_eq!(parse_transfer_rate(None), Ok(None));
        assert!(parse_transfer_rate(Some("2.5")).is_err());
        assert!(parse_transfer_rate(Some("abc")).is_err());
    }

    #[test]
    fn invalid_amount_names_the_field() {
        let ctx = context();
        let d = draft(OperationBody::Payment {
            destination: addr(2),
            amount: AmountInput::native("ten"),
            destination_tag: None,
        });
        let err = TransactionBuilder::new(&d, &ctx).build().unwrap_err();
        assert_eq!(err.field(), "amount");
    }

    #[test]
    fn json_roundtrip_preserves_operation() {
        let ctx = context();
        let op = TransactionBuilder::new(&payment(), &ctx).build().unwrap();
        let json = serde_json::to_string(&op).unwrap();
        let back: CanonicalOperation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }
}
