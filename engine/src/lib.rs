// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ledgerflow: Transaction Lifecycle Engine
//!
//! Turns a partially specified user intent into a signed, submitted (or
//! dry-run simulated) ledger operation, and tells you what happened.
//!
//! The hard parts are protocol invariants that are easy to get wrong and
//! expensive to discover afterwards: exactly one of sequence or ticket is
//! consumed, multi-signatures are ordered by account id, the fee scales
//! with the signer count, operations expire a fixed number of ledgers out,
//! and the account keeps its reserve.
//!
//! ## Architecture
//!
//! - **transaction**: drafts, the canonical operation builder, the wire
//!   codec, signing envelopes and signature verification.
//! - **ledger**: read/write traits, the context fetcher with its reserve
//!   cache, a JSON-RPC client and an in-memory sandbox ledger.
//! - **authority**: signing plans (direct, delegated, threshold), key
//!   providers and multi-signature aggregation.
//! - **preflight**: per-kind validation tables; every issue at once.
//! - **affordability**: the local reserve guard.
//! - **submission**: simulate/submit, the run state machine and events.
//! - **outcome**: result code classification and diagnostics.
//! - **pipeline**: [`Engine`], which wires all of the above per run.
//! - **error**, **config**, **metrics**, **crypto**: the supporting cast.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use ledgerflow::prelude::*;
//!
//! # async fn demo() -> Result<(), EngineError> {
//! let ledger = Arc::new(SandboxLedger::new());
//! let keys = Arc::new(InMemoryKeyStore::new());
//! let owner = keys.generate(KeyHandle::new("owner"));
//! ledger.fund(owner.account_id(), Drops(50_000_000));
//!
//! let engine = Engine::new(ledger, keys, EngineConfig::default());
//! let draft = OperationDraft::new(
//!     owner.account_id().to_address(),
//!     OperationBody::TicketCreate { count: "2".into() },
//!     SigningPreference::Master { key: KeyHandle::new("owner") },
//! );
//! let outcome = engine.submit(&draft).await?;
//! assert!(outcome.is_success);
//! # Ok(())
//! # }
//! ```

pub mod affordability;
pub mod authority;
pub mod config;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod preflight;
pub mod submission;
pub mod transaction;

pub use error::{EngineError, ErrorKind};
pub use pipeline::Engine;

/// The types most callers need.
pub mod prelude {
    pub use crate::authority::{InMemoryKeyStore, KeyHandle, KeyProvider};
    pub use crate::config::EngineConfig;
    pub use crate::crypto::address::AccountId;
    pub use crate::error::{EngineError, ErrorKind};
    pub use crate::ledger::{JsonRpcLedger, SandboxLedger};
    pub use crate::outcome::{OutcomeEnvelope, ResultClass, SubmissionMode};
    pub use crate::pipeline::Engine;
    pub use crate::submission::PipelineEvent;
    pub use crate::transaction::{
        AmountInput, Drops, MemoInput, OperationBody, OperationDraft, SignerChoice,
        SigningPreference,
    };
}
