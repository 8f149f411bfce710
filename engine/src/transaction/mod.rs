//! # Transaction Module
//!
//! Everything between a user's raw intent and a signed blob.
//!
//! ## Architecture
//!
//! ```text
//! types.rs       : Value types (Drops, IssuedValue, CurrencyCode, Amount, Memo, flags)
//! draft.rs       : OperationDraft: the raw, typed-per-kind user intent
//! builder.rs     : TransactionBuilder and the immutable CanonicalOperation
//! codec.rs       : Deterministic canonical bytes and signing data
//! signing.rs     : Single-key signing and the SignedEnvelope {blob, hash}
//! verification.rs: Signature checks over canonical bytes
//! ```
//!
//! ## Design Decisions
//!
//! - Money is integer only: `u64` drops and fixed-point issued values.
//! - Exactly one of `Sequence`/`TicketSequence` is consumed; a ticket forces
//!   `Sequence` to 0.
//! - Absent optional fields are omitted from both JSON and canonical bytes.

pub mod builder;
pub mod codec;
pub mod draft;
pub mod signing;
pub mod types;
pub mod verification;

pub use builder::{BuildError, CanonicalOperation, OperationFields, Sequencing, TransactionBuilder};
pub use draft::{
    AmountInput, MemoInput, OperationBody, OperationDraft, SignerChoice, SignerEntryInput,
    SigningPreference,
};
pub use signing::{sign_single, EnvelopeError, SignedEnvelope, SignedTransaction, SignerSignature};
pub use types::{
    AccountFlag, AccountFlags, Amount, CurrencyCode, Drops, FieldError, IssuedAmount, IssuedValue,
    Memo, OperationKind, SignerEntry,
};
pub use verification::{verify_signatures, Authorization, VerificationError};
