//! Core value types for ledger operations.
//!
//! These types form the vocabulary shared by the builder, the validator and
//! the sandbox ledger. Money is always integer: native amounts are `u64`
//! drops, issued values are fixed-point `i128` with 15 fractional digits.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::{
    DROPS_PER_COIN, ISSUED_DECIMALS, MAX_NATIVE_DROPS, NATIVE_CURRENCY, NATIVE_DECIMALS,
};
use crate::crypto::address::{AccountId, AddressError};

// ---------------------------------------------------------------------------
// Field parsing errors
// ---------------------------------------------------------------------------

/// Why a raw user-typed field could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("is required")]
    Missing,

    #[error("must be a number, got {0:?}")]
    NotANumber(String),

    #[error("allows at most {max} decimal places")]
    TooManyDecimals { max: usize },

    #[error("must be between {min} and {max}")]
    OutOfRange { min: u64, max: u64 },

    #[error("is not a valid address: {0}")]
    InvalidAddress(#[from] AddressError),

    #[error("is not a valid currency code: {0:?}")]
    InvalidCurrency(String),

    #[error("must name an issuer for non-native currency")]
    MissingIssuer,

    #[error("exceeds {max} bytes")]
    TooLong { max: usize },
}

// ---------------------------------------------------------------------------
// OperationKind
// ---------------------------------------------------------------------------

/// Discriminant for every operation family the engine can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationKind {
    Payment,
    TrustSet,
    EscrowCreate,
    EscrowFinish,
    EscrowCancel,
    OfferCreate,
    OfferCancel,
    AccountSet,
    SetRegularKey,
    SignerListSet,
    TicketCreate,
    NFTokenMint,
    NFTokenBurn,
}

impl OperationKind {
    /// Stable wire name, also used as the canonical serialization tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Payment => "Payment",
            Self::TrustSet => "TrustSet",
            Self::EscrowCreate => "EscrowCreate",
            Self::EscrowFinish => "EscrowFinish",
            Self::EscrowCancel => "EscrowCancel",
            Self::OfferCreate => "OfferCreate",
            Self::OfferCancel => "OfferCancel",
            Self::AccountSet => "AccountSet",
            Self::SetRegularKey => "SetRegularKey",
            Self::SignerListSet => "SignerListSet",
            Self::TicketCreate => "TicketCreate",
            Self::NFTokenMint => "NFTokenMint",
            Self::NFTokenBurn => "NFTokenBurn",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Drops
// ---------------------------------------------------------------------------

/// A native amount in drops (1 coin = 1,000,000 drops).
///
/// Serialized as a decimal string of drops, the way the ledger API carries
/// native amounts, so large values survive JSON number handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Drops(pub u64);

impl Drops {
    pub const ZERO: Drops = Drops(0);

    /// Parse a user-typed coin amount such as `"10"` or `"0.000001"`.
    pub fn parse_coins(input: &str) -> Result<Self, FieldError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FieldError::Missing);
        }
        let (whole, frac) = split_decimal(input)?;
        if frac.len() > NATIVE_DECIMALS {
            return Err(FieldError::TooManyDecimals {
                max: NATIVE_DECIMALS,
            });
        }

        let out_of_range = || FieldError::OutOfRange {
            min: 0,
            max: MAX_NATIVE_DROPS / DROPS_PER_COIN,
        };
        let whole: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| out_of_range())?
        };
        let frac_padded = format!("{:0<width$}", frac, width = NATIVE_DECIMALS);
        let frac: u64 = frac_padded
            .parse()
            .map_err(|_| FieldError::NotANumber(input.to_string()))?;

        let drops = whole
            .checked_mul(DROPS_PER_COIN)
            .and_then(|w| w.checked_add(frac))
            .filter(|d| *d <= MAX_NATIVE_DROPS)
            .ok_or_else(out_of_range)?;
        Ok(Drops(drops))
    }

    pub fn checked_add(self, other: Drops) -> Option<Drops> {
        self.0.checked_add(other.0).map(Drops)
    }

    pub fn checked_sub(self, other: Drops) -> Option<Drops> {
        self.0.checked_sub(other.0).map(Drops)
    }

    pub fn checked_mul(self, factor: u64) -> Option<Drops> {
        self.0.checked_mul(factor).map(Drops)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Drops {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} drops", self.0)
    }
}

impl Serialize for Drops {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Drops {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse::<u64>().map(Drops).map_err(serde::de::Error::custom)
    }
}

/// Split `"12.345"` into `("12", "345")`, rejecting signs and stray chars.
fn split_decimal(input: &str) -> Result<(&str, &str), FieldError> {
    let (whole, frac) = match input.split_once('.') {
        Some((w, f)) => (w, f),
        None => (input, ""),
    };
    let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if (whole.is_empty() && frac.is_empty()) || !digits_only(whole) || !digits_only(frac) {
        return Err(FieldError::NotANumber(input.to_string()));
    }
    Ok((whole, frac))
}

// ---------------------------------------------------------------------------
// IssuedValue
// ---------------------------------------------------------------------------

/// A non-negative issued-currency value, fixed point with 15 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct IssuedValue(i128);

impl IssuedValue {
    pub const ZERO: IssuedValue = IssuedValue(0);

    fn scale() -> i128 {
        10i128.pow(ISSUED_DECIMALS)
    }

    /// Parse a decimal string such as `"100"` or `"0.25"`.
    pub fn parse(input: &str) -> Result<Self, FieldError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(FieldError::Missing);
        }
        let (negative, unsigned) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input),
        };
        let (whole, frac) = split_decimal(unsigned)?;
        if frac.len() > ISSUED_DECIMALS as usize {
            return Err(FieldError::TooManyDecimals {
                max: ISSUED_DECIMALS as usize,
            });
        }
        let whole: i128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| FieldError::NotANumber(input.to_string()))?
        };
        let frac_padded = format!("{:0<width$}", frac, width = ISSUED_DECIMALS as usize);
        let frac: i128 = frac_padded
            .parse()
            .map_err(|_| FieldError::NotANumber(input.to_string()))?;
        let magnitude = whole
            .checked_mul(Self::scale())
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| FieldError::NotANumber(input.to_string()))?;
        Ok(IssuedValue(if negative { -magnitude } else { magnitude }))
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: IssuedValue) -> Option<IssuedValue> {
        self.0.checked_add(other.0).map(IssuedValue)
    }

    pub fn checked_sub(self, other: IssuedValue) -> Option<IssuedValue> {
        self.0.checked_sub(other.0).map(IssuedValue)
    }

    pub fn negate(self) -> IssuedValue {
        IssuedValue(-self.0)
    }
}

impl fmt::Display for IssuedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = Self::scale();
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / scale as u128;
        let frac = abs % scale as u128;
        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }
        let frac_str = format!("{:0>width$}", frac, width = ISSUED_DECIMALS as usize);
        write!(f, "{}{}.{}", sign, whole, frac_str.trim_end_matches('0'))
    }
}

impl Serialize for IssuedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for IssuedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        IssuedValue::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// CurrencyCode
// ---------------------------------------------------------------------------

/// An issued-currency code.
///
/// Three-character codes stay in short form. Anything from 4 to 20
/// characters is packed into the 20-byte protocol form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CurrencyCode {
    Standard(String),
    NonStandard([u8; 20]),
}

impl CurrencyCode {
    /// Normalize a user-typed code.
    pub fn parse(input: &str) -> Result<Self, FieldError> {
        let code = input.trim();
        if code.is_empty() {
            return Err(FieldError::Missing);
        }
        if code.eq_ignore_ascii_case(NATIVE_CURRENCY) {
            return Err(FieldError::InvalidCurrency(code.to_string()));
        }

        if code.len() == 40 && code.bytes().all(|b| b.is_ascii_hexdigit()) {
            let raw = hex::decode(code).map_err(|_| FieldError::InvalidCurrency(code.into()))?;
            // A leading zero byte marks the short form; those must be typed as 3 chars.
            if raw[0] == 0x00 {
                return Err(FieldError::InvalidCurrency(code.to_string()));
            }
            let mut bytes = [0u8; 20];
            bytes.copy_from_slice(&raw);
            return Ok(CurrencyCode::NonStandard(bytes));
        }

        if !code.bytes().all(|b| b.is_ascii_graphic()) {
            return Err(FieldError::InvalidCurrency(code.to_string()));
        }
        match code.len() {
            3 => Ok(CurrencyCode::Standard(code.to_string())),
            4..=20 => {
                let mut bytes = [0u8; 20];
                bytes[..code.len()].copy_from_slice(code.as_bytes());
                Ok(CurrencyCode::NonStandard(bytes))
            }
            _ => Err(FieldError::InvalidCurrency(code.to_string())),
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard(code) => f.write_str(code),
            Self::NonStandard(bytes) => f.write_str(&hex::encode_upper(bytes)),
        }
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CurrencyCode::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Amount
// ---------------------------------------------------------------------------

/// An issued-currency amount: who issued it, which code, how much.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuedAmount {
    pub currency: CurrencyCode,
    pub issuer: AccountId,
    pub value: IssuedValue,
}

/// Either a native amount or an issued one.
///
/// On the wire a native amount is a bare string of drops and an issued
/// amount is an object, matching the ledger API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Amount {
    Native(Drops),
    Issued(IssuedAmount),
}

impl Amount {
    /// Native drops moved by this amount, zero for issued amounts.
    pub fn native_drops(&self) -> Drops {
        match self {
            Amount::Native(d) => *d,
            Amount::Issued(_) => Drops::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Amount::Native(d) => d.is_zero(),
            Amount::Issued(i) => i.value.is_zero(),
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Native(d) => write!(f, "{}", d),
            Amount::Issued(i) => write!(f, "{} {}/{}", i.value, i.currency, i.issuer),
        }
    }
}

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// A memo with every present field already hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memo_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memo_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub memo_format: Option<String>,
}

impl Memo {
    /// Total bytes of the decoded memo content.
    pub fn byte_len(&self) -> usize {
        [&self.memo_type, &self.memo_data, &self.memo_format]
            .iter()
            .filter_map(|f| f.as_ref())
            .map(|h| h.len() / 2)
            .sum()
    }
}

/// Hex-encode user text, returning `None` for empty input.
pub fn text_to_hex(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(hex::encode_upper(text.as_bytes()))
    }
}

// ---------------------------------------------------------------------------
// Signer entries
// ---------------------------------------------------------------------------

/// One weighted member of an account's signer list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SignerEntry {
    pub account: AccountId,
    pub signer_weight: u16,
}

// ---------------------------------------------------------------------------
// Account flags
// ---------------------------------------------------------------------------

/// Account-level switches the engine reads or toggles via `AccountSet`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountFlag {
    RequireDestTag,
    DisableMaster,
    DefaultRipple,
    DepositAuth,
}

impl AccountFlag {
    /// The `SetFlag`/`ClearFlag` value the ledger expects.
    pub fn code(&self) -> u32 {
        match self {
            Self::RequireDestTag => 1,
            Self::DisableMaster => 4,
            Self::DefaultRipple => 8,
            Self::DepositAuth => 9,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::RequireDestTag),
            4 => Some(Self::DisableMaster),
            8 => Some(Self::DefaultRipple),
            9 => Some(Self::DepositAuth),
            _ => None,
        }
    }
}

/// Snapshot of an account's flags as reported by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountFlags {
    pub require_dest_tag: bool,
    pub disable_master: bool,
    pub default_ripple: bool,
    pub deposit_auth: bool,
}

impl AccountFlags {
    pub fn is_set(&self, flag: AccountFlag) -> bool {
        match flag {
            AccountFlag::RequireDestTag => self.require_dest_tag,
            AccountFlag::DisableMaster => self.disable_master,
            AccountFlag::DefaultRipple => self.default_ripple,
            AccountFlag::DepositAuth => self.deposit_auth,
        }
    }

    pub fn set(&mut self, flag: AccountFlag, on: bool) {
        match flag {
            AccountFlag::RequireDestTag => self.require_dest_tag = on,
            AccountFlag::DisableMaster => self.disable_master = on,
            AccountFlag::DefaultRipple => self.default_ripple = on,
            AccountFlag::DepositAuth => self.deposit_auth = on,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
