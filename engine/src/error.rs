//! Error taxonomy for a pipeline run.
//!
//! Each concern owns its own `thiserror` enum; [`EngineError`] composes them
//! so callers can match on the class of failure without caring which stage
//! produced it.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::affordability::AffordabilityError;
use crate::authority::SigningError;
use crate::ledger::client::NetworkError;
use crate::outcome::OutcomeEnvelope;
use crate::preflight::ValidationIssue;
use crate::transaction::builder::BuildError;

/// Coarse error class, stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Affordability,
    Signing,
    Network,
    LedgerRejection,
    StatusUnknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Affordability => "affordability",
            Self::Signing => "signing",
            Self::Network => "network",
            Self::LedgerRejection => "ledger_rejection",
            Self::StatusUnknown => "status_unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any failure of a pipeline run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// One or more local checks failed before signing. Always the full list.
    #[error("validation failed: {}", join_issues(.0))]
    Validation(Vec<ValidationIssue>),

    #[error("insufficient balance: {0}")]
    Affordability(#[from] AffordabilityError),

    #[error("signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    /// The ledger authoritatively refused the operation.
    #[error("ledger rejected operation: {} ({})", .0.engine_result_code, .0.diagnostic)]
    LedgerRejection(Box<OutcomeEnvelope>),

    /// Submit did not return a verdict in time. The operation may still be
    /// validated; query `hash` before retrying.
    #[error("status unknown for {hash} after {waited_ms}ms; check the transaction status before retrying")]
    StatusUnknown { hash: String, waited_ms: u64 },

    /// Builder invariant violation. Reported to callers as a validation issue.
    #[error("build failed: {0}")]
    Build(#[from] BuildError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) | Self::Build(_) => ErrorKind::Validation,
            Self::Affordability(_) => ErrorKind::Affordability,
            Self::Signing(_) => ErrorKind::Signing,
            Self::Network(_) => ErrorKind::Network,
            Self::LedgerRejection(_) => ErrorKind::LedgerRejection,
            Self::StatusUnknown { .. } => ErrorKind::StatusUnknown,
        }
    }

    /// Whether starting a fresh run may succeed without user changes.
    ///
    /// `StatusUnknown` is deliberately not retryable: the status must be
    /// checked first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Validation issues carried by this error, if any.
    pub fn issues(&self) -> Vec<ValidationIssue> {
        match self {
            Self::Validation(issues) => issues.clone(),
            Self::Build(e) => vec![ValidationIssue::from(e)],
            _ => Vec::new(),
        }
    }
}

fn join_issues(issues: &[ValidationIssue]) -> String {
    issues
        .iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::address::AccountId;

    #[test]
    fn validation_lists_every_issue() {
        let err = EngineError::Validation(vec![
            ValidationIssue::new("destination", "destination is required"),
            ValidationIssue::new("amount", "amount must be positive"),
        ]);
        let text = err.to_string();
        assert!(text.contains("destination is required"));
        assert!(text.contains("amount must be positive"));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.issues().len(), 2);
    }

    #[test]
    fn only_transient_network_errors_are_retryable() {
        let transport: EngineError = NetworkError::Transport("reset".into()).into();
        assert!(transport.is_retryable());

        let missing: EngineError = NetworkError::AccountNotFound(AccountId::from_bytes([1; 20])).into();
        assert!(!missing.is_retryable());

        let unknown = EngineError::StatusUnknown {
            hash: "AB".into(),
            waited_ms: 10,
        };
        assert!(!unknown.is_retryable());
        assert!(unknown.to_string().contains("check the transaction status"));
    }

    #[test]
    fn build_errors_surface_as_validation() {
        let err: EngineError = BuildError::TicketNotFound(7).into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let issues = err.issues();
        assert_eq!(issues.len(), 1);
        assert!(issues[0].message.contains('7'));
    }
}
