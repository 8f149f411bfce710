//! The user's raw intent, before any validation.
//!
//! An [`OperationDraft`] is what a screen or a JSON file hands to the
//! engine. Every value is kept exactly as typed (strings), so that the
//! preflight validator can report *every* malformed field at once instead
//! of failing on the first parse. Each operation kind is its own variant of
//! [`OperationBody`] with its own field set.

use serde::{Deserialize, Serialize};

use super::types::{
    AccountFlag, Amount, CurrencyCode, Drops, FieldError, IssuedAmount, IssuedValue,
    OperationKind,
};
use crate::authority::keystore::KeyHandle;
use crate::config::NATIVE_CURRENCY;
use crate::crypto::address::AccountId;

// ---------------------------------------------------------------------------
// OperationDraft
// ---------------------------------------------------------------------------

/// A partially specified operation as entered by the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDraft {
    /// Acting account address.
    pub account: String,

    /// The operation-specific fields.
    pub operation: OperationBody,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub memos: Vec<MemoInput>,

    /// One-shot ticket to consume instead of the account sequence.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,

    /// Which signing path the user chose.
    pub signing: SigningPreference,
}

impl OperationDraft {
    pub fn new(account: impl Into<String>, operation: OperationBody, signing: SigningPreference) -> Self {
        Self {
            account: account.into(),
            operation,
            memos: Vec::new(),
            ticket: None,
            source_tag: None,
            signing,
        }
    }

    pub fn with_ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = Some(ticket.into());
        self
    }

    pub fn with_memo(mut self, memo: MemoInput) -> Self {
        self.memos.push(memo);
        self
    }

    pub fn with_source_tag(mut self, tag: impl Into<String>) -> Self {
        self.source_tag = Some(tag.into());
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.operation.kind()
    }

    /// Ticket number if one is named and parses; `None` otherwise.
    pub fn ticket_number(&self) -> Option<u32> {
        self.ticket
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .and_then(|t| t.parse().ok())
    }
}

// ---------------------------------------------------------------------------
// Field inputs
// ---------------------------------------------------------------------------

/// An amount as typed: a value, plus currency and issuer for issued money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountInput {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
}

impl AmountInput {
    /// A native amount in whole coins, e.g. `"10"`.
    pub fn native(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            currency: None,
            issuer: None,
        }
    }

    pub fn issued(
        value: impl Into<String>,
        currency: impl Into<String>,
        issuer: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            currency: Some(currency.into()),
            issuer: Some(issuer.into()),
        }
    }

    /// `true` when no currency is named or the native code is named.
    pub fn is_native(&self) -> bool {
        match self.currency.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(code) => code.eq_ignore_ascii_case(NATIVE_CURRENCY),
        }
    }

    /// Normalize into an [`Amount`].
    pub fn parse(&self) -> Result<Amount, FieldError> {
        if self.is_native() {
            if self.issuer.as_deref().is_some_and(|i| !i.trim().is_empty()) {
                return Err(FieldError::InvalidCurrency(NATIVE_CURRENCY.to_string()));
            }
            return Drops::parse_coins(&self.value).map(Amount::Native);
        }
        self.parse_issued().map(Amount::Issued)
    }

    /// Normalize into an [`IssuedAmount`], rejecting native input.
    pub fn parse_issued(&self) -> Result<IssuedAmount, FieldError> {
        let code = self.currency.as_deref().unwrap_or_default();
        let currency = CurrencyCode::parse(code)?;
        let issuer = match self.issuer.as_deref().map(str::trim) {
            None | Some("") => return Err(FieldError::MissingIssuer),
            Some(raw) => raw.parse::<AccountId>()?,
        };
        let value = IssuedValue::parse(&self.value)?;
        if value.is_negative() {
            return Err(FieldError::NotANumber(self.value.clone()));
        }
        Ok(IssuedAmount {
            currency,
            issuer,
            value,
        })
    }
}

/// A memo as typed. Text is hex-encoded by the builder.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MemoInput {
    #[serde(default)]
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl MemoInput {
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            memo_type: None,
            format: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
            && self.memo_type.as_deref().unwrap_or_default().is_empty()
            && self.format.as_deref().unwrap_or_default().is_empty()
    }
}

/// One entry of a signer list being configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEntryInput {
    pub account: String,
    pub weight: String,
}

// ---------------------------------------------------------------------------
// OperationBody
// ---------------------------------------------------------------------------

/// Operation-specific fields, one variant per operation kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum OperationBody {
    Payment {
        destination: String,
        amount: AmountInput,
        #[serde(default)]
        destination_tag: Option<String>,
    },
    TrustSet {
        limit: AmountInput,
    },
    EscrowCreate {
        destination: String,
        /// Native amount in whole coins.
        amount: String,
        /// Seconds from now before the escrow may be finished.
        #[serde(default)]
        finish_after: Option<String>,
        /// Seconds from now after which the escrow may be cancelled.
        #[serde(default)]
        cancel_after: Option<String>,
        #[serde(default)]
        destination_tag: Option<String>,
    },
    EscrowFinish {
        owner: String,
        offer_sequence: String,
    },
    EscrowCancel {
        owner: String,
        offer_sequence: String,
    },
    OfferCreate {
        taker_pays: AmountInput,
        taker_gets: AmountInput,
        /// Seconds from now until the offer expires.
        #[serde(default)]
        expiration: Option<String>,
    },
    OfferCancel {
        offer_sequence: String,
    },
    AccountSet {
        #[serde(default)]
        set_flag: Option<AccountFlag>,
        #[serde(default)]
        clear_flag: Option<AccountFlag>,
        #[serde(default)]
        domain: Option<String>,
        /// Decimal transfer rate, `"1.0"` to `"2.0"`.
        #[serde(default)]
        transfer_rate: Option<String>,
    },
    SetRegularKey {
        /// Address of the new regular key; absent or empty clears it.
        #[serde(default)]
        regular_key: Option<String>,
    },
    SignerListSet {
        quorum: String,
        signers: Vec<SignerEntryInput>,
    },
    TicketCreate {
        count: String,
    },
    NFTokenMint {
        taxon: String,
        #[serde(default)]
        uri: Option<String>,
        /// Secondary-sale fee in 1/100000 units; needs `transferable`.
        #[serde(default)]
        transfer_fee: Option<String>,
        #[serde(default)]
        transferable: bool,
    },
    NFTokenBurn {
        token_id: String,
    },
}

impl OperationBody {
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

    /// Issued-currency amounts this operation moves or limits.
    ///
    /// Used to decide whether trust lines must be fetched.
    pub fn issued_inputs(&self) -> Vec<&AmountInput> {
        let candidates: Vec<&AmountInput> = match self {
            Self::Payment { amount, .. } => vec![amount],
            Self::TrustSet { limit } => vec![limit],
            Self::OfferCreate { taker_gets, .. } => vec![taker_gets],
            _ => Vec::new(),
        };
        candidates.into_iter().filter(|a| !a.is_native()).collect()
    }
}

// ---------------------------------------------------------------------------
// SigningPreference
// ---------------------------------------------------------------------------

/// A signer chosen by the user for a multi-signed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerChoice {
    pub account: String,
    pub key: KeyHandle,
}

/// The signing path the user toggled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum SigningPreference {
    Master { key: KeyHandle },
    RegularKey { key: KeyHandle },
    MultiSign { signers: Vec<SignerChoice> },
}

impl SigningPreference {
    pub fn is_master(&self) -> bool {
        matches!(self, Self::Master { .. })
    }

    pub fn is_multisign(&self) -> bool {
        matches!(self, Self::MultiSign { .. })
    }
}

// ---------------------------------------------------------------------------
// Scalar helpers
// ---------------------------------------------------------------------------

/// Parse an optional numeric field: absent or blank yields `None`.
pub fn parse_optional_u32(raw: Option<&str>) -> Result<Option<u32>, FieldError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) => v
            .parse::<u32>()
            .map(Some)
            .map_err(|_| FieldError::NotANumber(v.to_string())),
    }
}

/// Parse a required numeric field within `[min, max]`.
pub fn parse_u32_in(raw: &str, min: u32, max: u32) -> Result<u32, FieldError> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(FieldError::Missing);
    }
    let n: u32 = v
        .parse()
        .map_err(|_| FieldError::NotANumber(v.to_string()))?;
    if n < min || n > max {
        return Err(FieldError::OutOfRange {
            min: min as u64,
            max: max as u64,
        });
    }
    Ok(n)
}

/// Parse a required address field.
pub fn parse_address(raw: &str) -> Result<AccountId, FieldError> {
    let v = raw.trim();
    if v.is_empty() {
        return Err(FieldError::Missing);
    }
    Ok(v.parse::<AccountId>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> String {
        AccountId::from_bytes([b; 20]).to_address()
    }

    #[test]
    fn draft_json_is_tagged_by_kind() {
        let json = format!(
            r#"{{
                "account": "{}",
                "operation": {{
                    "kind": "Payment",
                    "destination": "{}",
                    "amount": {{ "value": "10" }}
                }},
                "signing": {{ "mode": "master", "key": "alice" }}
            }}"#,
            addr(1),
            addr(2)
        );
        let draft: OperationDraft = serde_json::from_str(&json).unwrap();
        assert_eq!(draft.kind(), OperationKind::Payment);
        assert!(draft.memos.is_empty());
        assert!(draft.signing.is_master());
    }

    #[test]
    fn native_amount_input() {
        let a = AmountInput::native("10");
        assert!(a.is_native());
        assert_eq!(a.parse().unwrap(), Amount::Native(Drops(10_000_000)));

        let explicit = AmountInput {
            value: "1".into(),
            currency: Some("xrp".into()),
            issuer: None,
        };
        assert!(explicit.is_native());
    }

    #[test]
    fn issued_amount_requires_issuer() {
        let a = AmountInput {
            value: "5".into(),
            currency: Some("USD".into()),
            issuer: None,
        };
        assert_eq!(a.parse(), Err(FieldError::MissingIssuer));

        let ok = AmountInput::issued("5", "USD", addr(9));
        assert!(matches!(ok.parse().unwrap(), Amount::Issued(_)));
    }

    #[test]
    fn native_amount_with_issuer_is_rejected() {
        let a = AmountInput {
            value: "5".into(),
            currency: None,
            issuer: Some(addr(9)),
        };
        assert!(a.parse().is_err());
    }

    #[test]
    fn issued_inputs_only_lists_non_native() {
        let body = OperationBody::OfferCreate {
            taker_pays: AmountInput::issued("1", "USD", addr(3)),
            taker_gets: AmountInput::native("2"),
            expiration: None,
        };
        assert!(body.issued_inputs().is_empty());

        let pay = OperationBody::Payment {
            destination: addr(2),
            amount: AmountInput::issued("1", "USD", addr(3)),
            destination_tag: None,
        };
        assert_eq!(pay.issued_inputs().len(), 1);
    }

    #[test]
    fn ticket_number_ignores_garbage() {
        let draft = OperationDraft::new(
            addr(1),
            OperationBody::OfferCancel {
                offer_sequence: "3".into(),
            },
            SigningPreference::Master { key: KeyHandle::new("k") },
        );
        assert_eq!(draft.clone().with_ticket("7").ticket_number(), Some(7));
        assert_eq!(draft.clone().with_ticket("seven").ticket_number(), None);
        assert_eq!(draft.ticket_number(), None);
    }

    #[test]
    fn scalar_helpers() {
        assert_eq!(parse_optional_u32(None), Ok(None));
        assert_eq!(parse_optional_u32(Some("  ")), Ok(None));
        assert_eq!(parse_optional_u32(Some("0")), Ok(Some(0)));
        assert!(parse_optional_u32(Some("x")).is_err());
        assert!(matches!(
            parse_u32_in("0", 1, 10),
            Err(FieldError::OutOfRange { min: 1, max: 10 })
        ));
        assert_eq!(parse_u32_in("10", 1, 10), Ok(10));
        assert_eq!(parse_address(""), Err(FieldError::Missing));
    }
}
