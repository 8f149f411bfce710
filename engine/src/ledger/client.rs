//! Ledger read/write interfaces and the data they return.
//!
//! The engine never talks to a network directly; it talks to a
//! [`LedgerReader`] and a [`LedgerWriter`]. Reads are idempotent and safe to
//! issue concurrently. Writes are the only calls that can change ledger
//! state, and `submit_and_wait` must never be retried blindly.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::address::AccountId;
use crate::transaction::builder::CanonicalOperation;
use crate::transaction::signing::SignedEnvelope;
use crate::transaction::types::{AccountFlags, CurrencyCode, Drops, IssuedValue, SignerEntry};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A read or write call that did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    /// The request never left this process (connect refused, bad URL).
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    /// The exchange broke after the request may have been delivered.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error("{method} timed out after {after_ms}ms")]
    Timeout { method: String, after_ms: u64 },

    #[error("account {0} not found")]
    AccountNotFound(AccountId),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server error {code}: {message}")]
    Rpc { code: i32, message: String },
}

impl NetworkError {
    /// Whether the caller may reasonably retry the same read.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable(_) | Self::Transport(_) | Self::Timeout { .. }
        )
    }

    /// Whether a write that failed this way may still have been applied.
    /// Only `Unreachable` and server-side error objects prove it was not.
    pub fn write_outcome_unknown(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout { .. } | Self::Malformed(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Read models
// ---------------------------------------------------------------------------

/// Account root as reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account: AccountId,
    pub balance: Drops,
    pub sequence: u32,
    pub owner_count: u32,
    #[serde(default)]
    pub flags: AccountFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regular_key: Option<AccountId>,
}

/// Current fee basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    pub base_fee: Drops,
}

/// Reserve parameters: `base + increment * owned objects`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveInfo {
    pub base: Drops,
    pub increment: Drops,
}

impl ReserveInfo {
    /// Minimum balance for an account owning `owned` objects.
    pub fn required(&self, owned: u32) -> Option<Drops> {
        self.increment
            .checked_mul(owned as u64)
            .and_then(|inc| self.base.checked_add(inc))
    }
}

/// Server-level information; changes rarely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub reserves: ReserveInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_id: Option<u32>,
}

/// A configured signer list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerList {
    pub quorum: u32,
    pub entries: Vec<SignerEntry>,
}

impl SignerList {
    pub fn weight_of(&self, account: &AccountId) -> Option<u16> {
        self.entries
            .iter()
            .find(|e| e.account == *account)
            .map(|e| e.signer_weight)
    }
}

/// One trust line from the perspective of the queried account.
///
/// A positive `balance` means the account holds the peer's currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustLine {
    pub peer: AccountId,
    pub currency: CurrencyCode,
    pub balance: IssuedValue,
    pub limit: IssuedValue,
}

/// Result of looking a transaction up by hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatus {
    pub hash: String,
    pub found: bool,
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
}

/// Raw response of a simulate or submit call, before classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    pub engine_result: String,
    #[serde(default)]
    pub validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The full server payload, kept for the caller.
    #[serde(default)]
    pub body: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Read-only ledger API.
#[async_trait]
pub trait LedgerReader: Send + Sync {
    /// Identifies the backing network; used as the server-info cache key.
    fn endpoint(&self) -> String;

    async fn account_info(&self, account: &AccountId) -> Result<AccountInfo, NetworkError>;

    async fn fee(&self) -> Result<FeeInfo, NetworkError>;

    /// Index of the current open ledger (the expiration horizon).
    async fn current_ledger_index(&self) -> Result<u32, NetworkError>;

    async fn server_info(&self) -> Result<ServerInfo, NetworkError>;

    async fn account_tickets(&self, account: &AccountId) -> Result<Vec<u32>, NetworkError>;

    async fn signer_list(&self, account: &AccountId) -> Result<Option<SignerList>, NetworkError>;

    async fn account_lines(&self, account: &AccountId) -> Result<Vec<TrustLine>, NetworkError>;

    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, NetworkError>;
}

/// State-changing ledger API.
#[async_trait]
pub trait LedgerWriter: Send + Sync {
    /// Dry-run the unsigned operation. Never consumes sequence or tickets.
    async fn simulate(&self, operation: &CanonicalOperation) -> Result<RawResponse, NetworkError>;

    /// Submit and block until the operation is validated or conclusively
    /// rejected.
    async fn submit_and_wait(&self, envelope: &SignedEnvelope)
        -> Result<RawResponse, NetworkError>;
}
