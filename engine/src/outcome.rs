//! # Result Classification
//!
//! Maps the ledger engine's result code to one of four classes and a stable
//! human-readable diagnostic:
//!
//! | Prefix        | Class       | Meaning                                       |
//! |---------------|-------------|-----------------------------------------------|
//! | `tesSUCCESS`  | `Success`   | Included and applied                          |
//! | `tec`         | `Rejected`  | Included, fee charged, effect failed          |
//! | `tef` / `tem` | `Rejected`  | Can never succeed as signed                   |
//! | `ter` / `tel` | `Retryable` | Transient local or server condition           |
//! | anything else | `Unknown`   | Unrecognized response shape                   |
//!
//! Classification never fails: an unrecognized code still yields a generic,
//! non-empty diagnostic.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::EngineError;
use crate::ledger::client::RawResponse;

/// Engine result codes produced or interpreted by this crate.
pub mod codes {
    pub const TES_SUCCESS: &str = "tesSUCCESS";

    pub const TEC_DST_TAG_NEEDED: &str = "tecDST_TAG_NEEDED";
    pub const TEC_INSUF_RESERVE_LINE: &str = "tecINSUF_RESERVE_LINE";
    pub const TEC_INSUF_RESERVE_OFFER: &str = "tecINSUF_RESERVE_OFFER";
    pub const TEC_INSUFFICIENT_RESERVE: &str = "tecINSUFFICIENT_RESERVE";
    pub const TEC_NO_ALTERNATIVE_KEY: &str = "tecNO_ALTERNATIVE_KEY";
    pub const TEC_NO_DST: &str = "tecNO_DST";
    pub const TEC_NO_DST_INSUF_XRP: &str = "tecNO_DST_INSUF_XRP";
    pub const TEC_NO_ENTRY: &str = "tecNO_ENTRY";
    pub const TEC_NO_PERMISSION: &str = "tecNO_PERMISSION";
    pub const TEC_NO_TARGET: &str = "tecNO_TARGET";
    pub const TEC_PATH_DRY: &str = "tecPATH_DRY";
    pub const TEC_PATH_PARTIAL: &str = "tecPATH_PARTIAL";
    pub const TEC_UNFUNDED: &str = "tecUNFUNDED";
    pub const TEC_UNFUNDED_OFFER: &str = "tecUNFUNDED_OFFER";
    pub const TEC_UNFUNDED_PAYMENT: &str = "tecUNFUNDED_PAYMENT";

    pub const TEF_BAD_AUTH: &str = "tefBAD_AUTH";
    pub const TEF_BAD_QUORUM: &str = "tefBAD_QUORUM";
    pub const TEF_BAD_SIGNATURE: &str = "tefBAD_SIGNATURE";
    pub const TEF_MASTER_DISABLED: &str = "tefMASTER_DISABLED";
    pub const TEF_MAX_LEDGER: &str = "tefMAX_LEDGER";
    pub const TEF_NO_TICKET: &str = "tefNO_TICKET";
    pub const TEF_NOT_MULTI_SIGNING: &str = "tefNOT_MULTI_SIGNING";
    pub const TEF_PAST_SEQ: &str = "tefPAST_SEQ";

    pub const TEM_BAD_AMOUNT: &str = "temBAD_AMOUNT";
    pub const TEM_BAD_EXPIRATION: &str = "temBAD_EXPIRATION";
    pub const TEM_BAD_QUORUM: &str = "temBAD_QUORUM";
    pub const TEM_BAD_REGKEY: &str = "temBAD_REGKEY";
    pub const TEM_BAD_SIGNATURE: &str = "temBAD_SIGNATURE";
    pub const TEM_BAD_SIGNER: &str = "temBAD_SIGNER";
    pub const TEM_DST_IS_SRC: &str = "temDST_IS_SRC";
    pub const TEM_INVALID_FLAG: &str = "temINVALID_FLAG";
    pub const TEM_MALFORMED: &str = "temMALFORMED";
    pub const TEM_REDUNDANT: &str = "temREDUNDANT";
    pub const TEM_SEQ_AND_TICKET: &str = "temSEQ_AND_TICKET";

    pub const TER_INSUF_FEE_B: &str = "terINSUF_FEE_B";
    pub const TER_NO_ACCOUNT: &str = "terNO_ACCOUNT";
    pub const TER_PRE_SEQ: &str = "terPRE_SEQ";

    pub const TEL_INSUF_FEE_P: &str = "telINSUF_FEE_P";
}

// ---------------------------------------------------------------------------
// Diagnostics table
// ---------------------------------------------------------------------------

const DIAGNOSTICS: &[(&str, &str)] = &[
    (codes::TES_SUCCESS, "The operation was applied and validated."),
    (codes::TEC_DST_TAG_NEEDED, "The destination requires a destination tag."),
    (codes::TEC_INSUF_RESERVE_LINE, "Insufficient reserve to create the trust line."),
    (codes::TEC_INSUF_RESERVE_OFFER, "Insufficient reserve to create the offer."),
    (codes::TEC_INSUFFICIENT_RESERVE, "Insufficient reserve for the new ledger object."),
    (codes::TEC_NO_ALTERNATIVE_KEY, "The master key cannot be disabled without another signing method."),
    (codes::TEC_NO_DST, "The destination account does not exist."),
    (codes::TEC_NO_DST_INSUF_XRP, "The destination does not exist and the amount is below the account reserve."),
    (codes::TEC_NO_ENTRY, "The referenced ledger object does not exist."),
    (codes::TEC_NO_PERMISSION, "The account is not permitted to perform this operation now."),
    (codes::TEC_NO_TARGET, "The target object does not exist."),
    (codes::TEC_PATH_DRY, "No liquidity: the destination cannot receive this currency."),
    (codes::TEC_PATH_PARTIAL, "Only part of the amount could be delivered."),
    (codes::TEC_UNFUNDED, "Insufficient balance for this operation."),
    (codes::TEC_UNFUNDED_OFFER, "The offer is not funded."),
    (codes::TEC_UNFUNDED_PAYMENT, "Insufficient balance to send this amount while keeping the reserve."),
    (codes::TEF_BAD_AUTH, "The signing key is not authorized for this account."),
    (codes::TEF_BAD_QUORUM, "The signatures do not meet the signer list quorum."),
    (codes::TEF_BAD_SIGNATURE, "A signer is not on the account's signer list."),
    (codes::TEF_MASTER_DISABLED, "The master key is disabled for this account."),
    (codes::TEF_MAX_LEDGER, "The operation expired before it could be included."),
    (codes::TEF_NO_TICKET, "The ticket does not exist or was already used."),
    (codes::TEF_NOT_MULTI_SIGNING, "The account has no signer list configured."),
    (codes::TEF_PAST_SEQ, "The sequence number has already been used."),
    (codes::TEM_BAD_AMOUNT, "The amount is invalid."),
    (codes::TEM_BAD_EXPIRATION, "The expiration or time window is invalid."),
    (codes::TEM_BAD_QUORUM, "The quorum cannot be met by the listed signers."),
    (codes::TEM_BAD_REGKEY, "The regular key cannot be the account itself."),
    (codes::TEM_BAD_SIGNATURE, "The signature is malformed or invalid."),
    (codes::TEM_BAD_SIGNER, "The signer list or Signers array is malformed."),
    (codes::TEM_DST_IS_SRC, "The destination is the same as the source."),
    (codes::TEM_INVALID_FLAG, "The flag combination is invalid."),
    (codes::TEM_MALFORMED, "The operation is malformed."),
    (codes::TEM_REDUNDANT, "The operation would have no effect."),
    (codes::TEM_SEQ_AND_TICKET, "Sequence and ticket cannot both be set."),
    (codes::TER_INSUF_FEE_B, "The account cannot pay the fee right now."),
    (codes::TER_NO_ACCOUNT, "The source account does not exist yet."),
    (codes::TER_PRE_SEQ, "The sequence number is ahead of the account; an earlier operation is missing."),
    (codes::TEL_INSUF_FEE_P, "The fee is below the current load-adjusted minimum."),
];

/// Human-readable diagnostic for `code`. Never empty.
pub fn describe(code: &str) -> String {
    if let Some((_, text)) = DIAGNOSTICS.iter().find(|(c, _)| *c == code) {
        return (*text).to_string();
    }
    let generic = match classify_code(code) {
        ResultClass::Success => "The operation succeeded",
        ResultClass::Rejected => "The ledger rejected the operation",
        ResultClass::Retryable => "The operation was not applied; it may succeed later",
        ResultClass::Unknown => "The ledger returned an unrecognized result",
    };
    if code.is_empty() {
        format!("{}.", generic)
    } else {
        format!("{} ({}).", generic, code)
    }
}

// ---------------------------------------------------------------------------
// Classes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultClass {
    Success,
    Rejected,
    Retryable,
    Unknown,
}

impl ResultClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Retryable => "retryable",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of a raw engine result code.
pub fn classify_code(code: &str) -> ResultClass {
    if code == codes::TES_SUCCESS {
        return ResultClass::Success;
    }
    let prefix = code.get(..3).unwrap_or_default();
    let has_tail = code.len() > 3;
    match prefix {
        "tec" | "tef" | "tem" if has_tail => ResultClass::Rejected,
        "ter" | "tel" if has_tail => ResultClass::Retryable,
        _ => ResultClass::Unknown,
    }
}

/// Whether the run only evaluated or actually broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionMode {
    Simulate,
    Submit,
}

impl fmt::Display for SubmissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simulate => f.write_str("simulate"),
            Self::Submit => f.write_str("submit"),
        }
    }
}

// ---------------------------------------------------------------------------
// OutcomeEnvelope
// ---------------------------------------------------------------------------

/// The single result of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeEnvelope {
    pub engine_result_code: String,
    pub class: ResultClass,
    /// No later ledger can change this verdict.
    pub is_final: bool,
    pub is_success: bool,
    pub diagnostic: String,
    pub mode: SubmissionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
    pub raw_response: serde_json::Value,
}

impl OutcomeEnvelope {
    /// Turn an authoritative rejection into an error; pass anything else.
    pub fn into_result(self) -> Result<OutcomeEnvelope, EngineError> {
        match self.class {
            ResultClass::Rejected => Err(EngineError::LedgerRejection(Box::new(self))),
            _ => Ok(self),
        }
    }
}

/// Stateless classifier.
pub struct ResultClassifier;

impl ResultClassifier {
    pub fn classify(raw: &RawResponse, mode: SubmissionMode) -> OutcomeEnvelope {
        let code = raw.engine_result.trim();
        let class = classify_code(code);

        // Simulation is advisory: nothing it says is final.
        let is_final = match mode {
            SubmissionMode::Simulate => false,
            SubmissionMode::Submit => match class {
                ResultClass::Success => raw.validated,
                ResultClass::Rejected => true,
                ResultClass::Retryable | ResultClass::Unknown => false,
            },
        };
        let is_success = class == ResultClass::Success
            && (mode == SubmissionMode::Simulate || raw.validated);

        OutcomeEnvelope {
            engine_result_code: code.to_string(),
            class,
            is_final,
            is_success,
            diagnostic: describe(code),
            mode,
            transaction_hash: raw.hash.clone(),
            ledger_index: raw.ledger_index,
            raw_response: raw.body.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(code: &str, validated: bool) -> RawResponse {
        RawResponse {
            engine_result: code.to_string(),
            validated,
            ledger_index: Some(7),
            hash: Some("AB".into()),
            message: None,
            body: serde_json::json!({ "engine_result": code }),
        }
    }

    #[test]
    fn code_prefixes_map_to_classes() {
        assert_eq!(classify_code("tesSUCCESS"), ResultClass::Success);
        assert_eq!(classify_code("tecUNFUNDED_PAYMENT"), ResultClass::Rejected);
        assert_eq!(classify_code("tefBAD_QUORUM"), ResultClass::Rejected);
        assert_eq!(classify_code("temMALFORMED"), ResultClass::Rejected);
        assert_eq!(classify_code("terPRE_SEQ"), ResultClass::Retryable);
        assert_eq!(classify_code("telINSUF_FEE_P"), ResultClass::Retryable);
        assert_eq!(classify_code("tec"), ResultClass::Unknown);
        assert_eq!(classify_code(""), ResultClass::Unknown);
        assert_eq!(classify_code("weird"), ResultClass::Unknown);
    }

    #[test]
    fn validated_success_is_final() {
        let out = ResultClassifier::classify(&raw("tesSUCCESS", true), SubmissionMode::Submit);
        assert!(out.is_final);
        assert!(out.is_success);
        assert_eq!(out.transaction_hash.as_deref(), Some("AB"));
    }

    #[test]
    fn unvalidated_success_is_not_final() {
        let out = ResultClassifier::classify(&raw("tesSUCCESS", false), SubmissionMode::Submit);
        assert!(!out.is_final);
        assert!(!out.is_success);
    }

    #[test]
    fn simulation_is_never_final() {
        let out = ResultClassifier::classify(&raw("tecNO_DST", false), SubmissionMode::Simulate);
        assert_eq!(out.class, ResultClass::Rejected);
        assert!(!out.is_final);
        let ok = ResultClassifier::classify(&raw("tesSUCCESS", false), SubmissionMode::Simulate);
        assert!(ok.is_success);
        assert!(!ok.is_final);
    }

    #[test]
    fn retryable_is_not_final() {
        let out = ResultClassifier::classify(&raw("terPRE_SEQ", false), SubmissionMode::Submit);
        assert_eq!(out.class, ResultClass::Retryable);
        assert!(!out.is_final);
    }

    #[test]
    fn unknown_codes_get_generic_diagnostic() {
        let out = ResultClassifier::classify(&raw("xyzSTRANGE", false), SubmissionMode::Submit);
        assert_eq!(out.class, ResultClass::Unknown);
        assert!(!out.diagnostic.is_empty());
        assert!(out.diagnostic.contains("xyzSTRANGE"));
        assert!(!describe("").is_empty());
        assert!(describe("tecSOMETHING_NEW").contains("rejected"));
    }

    #[test]
    fn known_codes_use_table() {
        assert_eq!(
            describe(codes::TEF_MASTER_DISABLED),
            "The master key is disabled for this account."
        );
    }

    #[test]
    fn rejection_becomes_error() {
        let out = ResultClassifier::classify(&raw("tefBAD_QUORUM", true), SubmissionMode::Submit);
        match out.into_result() {
            Err(EngineError::LedgerRejection(env)) => {
                assert_eq!(env.engine_result_code, "tefBAD_QUORUM")
            }
            other => panic!("expected rejection, got {:?}", other),
        }
        let ok = ResultClassifier::classify(&raw("tesSUCCESS", true), SubmissionMode::Submit);
        assert!(ok.into_result().is_ok());
    }
}
