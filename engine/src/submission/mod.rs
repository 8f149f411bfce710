//! # Submission
//!
//! Sends a finished operation to the ledger in one of two exclusive modes
//! and classifies whatever comes back.
//!
//! ## Modes
//!
//! ```text
//!   Simulate:  CanonicalOperation (unsigned) --> simulate()        --> advisory result
//!   Submit:    SignedEnvelope               --> submit_and_wait() --> final verdict
//! ```
//!
//! Simulation never consumes a sequence number or ticket. A passing
//! simulation says nothing about a later submit.
//!
//! A submit is never retried here. If no verdict arrives within the submit
//! timeout, or the exchange breaks after the blob may have been delivered
//! (reset connection, unreadable reply), the operation may still be
//! validated later, so the run ends with [`EngineError::StatusUnknown`]
//! carrying the hash to query. Only a request that provably never left
//! stays a plain network error. Resubmitting before the query is answered
//! risks a double apply.

pub mod events;
pub mod state;

pub use events::{EventBus, PipelineEvent};
pub use state::{RunState, RunStateMachine, Stage};

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::ledger::client::{LedgerWriter, NetworkError, RawResponse};
use crate::outcome::{OutcomeEnvelope, ResultClassifier, SubmissionMode};
use crate::transaction::builder::CanonicalOperation;
use crate::transaction::signing::SignedEnvelope;

/// What to send.
#[derive(Debug, Clone, Copy)]
pub enum Submission<'a> {
    Simulate(&'a CanonicalOperation),
    Submit(&'a SignedEnvelope),
}

impl Submission<'_> {
    pub fn mode(&self) -> SubmissionMode {
        match self {
            Self::Simulate(_) => SubmissionMode::Simulate,
            Self::Submit(_) => SubmissionMode::Submit,
        }
    }
}

pub struct SubmissionCoordinator {
    writer: Arc<dyn LedgerWriter>,
    submit_timeout: Duration,
}

impl SubmissionCoordinator {
    pub fn new(writer: Arc<dyn LedgerWriter>, submit_timeout: Duration) -> Self {
        Self {
            writer,
            submit_timeout,
        }
    }

    /// Send, classify and advance `machine` to its terminal state.
    ///
    /// `machine` must be in `Signed`. A ledger rejection is returned as a
    /// classified envelope; turning it into an error is the caller's call.
    pub async fn run(
        &self,
        submission: Submission<'_>,
        machine: &mut RunStateMachine,
    ) -> Result<OutcomeEnvelope, EngineError> {
        let (raw, stage) = match submission {
            Submission::Simulate(op) => (self.simulate(op).await, Stage::Simulate),
            Submission::Submit(envelope) => (self.submit(envelope).await, Stage::Submit),
        };
        let raw = match raw {
            Ok(raw) => raw,
            Err(e) => {
                machine.abort(stage);
                return Err(e);
            }
        };

        match submission {
            Submission::Simulate(_) => machine.mark_simulated(),
            Submission::Submit(_) => machine.mark_submitted(),
        };

        let mut outcome = ResultClassifier::classify(&raw, submission.mode());
        if let (Submission::Submit(envelope), None) = (submission, &outcome.transaction_hash) {
            outcome.transaction_hash = Some(envelope.hash().to_string());
        }
        machine.mark_classified(outcome.class);

        info!(
            run_id = %machine.run_id(),
            mode = %outcome.mode,
            code = %outcome.engine_result_code,
            class = %outcome.class,
            elapsed_ms = machine.elapsed_ms(),
            "run classified"
        );
        Ok(outcome)
    }

    pub async fn simulate(&self, op: &CanonicalOperation) -> Result<RawResponse, EngineError> {
        Ok(self.writer.simulate(op).await?)
    }

    /// Submit and wait, mapping a missing verdict to `StatusUnknown`.
    pub async fn submit(&self, envelope: &SignedEnvelope) -> Result<RawResponse, EngineError> {
        let waited_ms = self.submit_timeout.as_millis() as u64;
        let started = Instant::now();
        match tokio::time::timeout(self.submit_timeout, self.writer.submit_and_wait(envelope)).await
        {
            Ok(Ok(raw)) => Ok(raw),
            Ok(Err(NetworkError::Timeout { after_ms, .. })) => {
                warn!(hash = envelope.hash(), after_ms, "submit timed out at transport");
                Err(EngineError::StatusUnknown {
                    hash: envelope.hash().to_string(),
                    waited_ms: after_ms,
                })
            }
            Ok(Err(e)) if e.write_outcome_unknown() => {
                let waited_ms = started.elapsed().as_millis() as u64;
                warn!(hash = envelope.hash(), error = %e, waited_ms, "submit reply lost");
                Err(EngineError::StatusUnknown {
                    hash: envelope.hash().to_string(),
                    waited_ms,
                })
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                warn!(hash = envelope.hash(), waited_ms, "no verdict before submit timeout");
                Err(EngineError::StatusUnknown {
                    hash: envelope.hash().to_string(),
                    waited_ms,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::context::LedgerContext;
    use crate::ledger::sandbox::SandboxLedger;
    use crate::authority::keystore::KeyHandle;
    use crate::outcome::ResultClass;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::draft::{AmountInput, OperationBody, OperationDraft, SigningPreference};
    use crate::transaction::signing::sign_single;
    use crate::transaction::types::Drops;
    use uuid::Uuid;

    fn signed(ledger: &SandboxLedger) -> (CanonicalOperation, SignedEnvelope) {
        let key = KeyPair::from_seed(&[3; 32]);
        let account = key.account_id();
        ledger.fund(account, Drops(50_000_000));
        let mut ctx = LedgerContext::for_tests(account);
        ctx.sequence = ledger.sequence_of(&account).unwrap();
        ctx.expiration_horizon = ledger.ledger_index();
        let draft = OperationDraft::new(
            account.to_address(),
            OperationBody::Payment {
                destination: KeyPair::from_seed(&[4; 32]).account_id().to_address(),
                amount: AmountInput::native("5"),
                destination_tag: None,
            },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        );
        let op = TransactionBuilder::new(&draft, &ctx).build().unwrap();
        let env = sign_single(&op, &key).unwrap();
        (op, env)
    }

    fn signed_machine() -> RunStateMachine {
        let mut m = RunStateMachine::built(Uuid::new_v4());
        m.mark_signed();
        m
    }

    #[tokio::test]
    async fn submit_classifies_and_reaches_terminal_state() {
        let ledger = Arc::new(SandboxLedger::new());
        let (_, env) = signed(&ledger);
        let coordinator = SubmissionCoordinator::new(ledger.clone(), Duration::from_secs(5));
        let mut m = signed_machine();

        let out = coordinator.run(Submission::Submit(&env), &mut m).await.unwrap();
        assert_eq!(out.class, ResultClass::Success);
        assert!(out.is_final);
        assert_eq!(out.transaction_hash.as_deref(), Some(env.hash()));
        assert!(m.is_terminal());
    }

    #[tokio::test]
    async fn simulate_leaves_sequence_alone() {
        let ledger = Arc::new(SandboxLedger::new());
        let (op, _) = signed(&ledger);
        let before = ledger.sequence_of(&op.account());
        let coordinator = SubmissionCoordinator::new(ledger.clone(), Duration::from_secs(5));
        let mut m = signed_machine();

        let out = coordinator.run(Submission::Simulate(&op), &mut m).await.unwrap();
        assert_eq!(out.mode, SubmissionMode::Simulate);
        assert!(!out.is_final);
        assert_eq!(ledger.sequence_of(&op.account()), before);
    }

    #[tokio::test]
    async fn slow_submit_is_status_unknown() {
        let ledger = Arc::new(SandboxLedger::new().with_submit_delay(Duration::from_millis(500)));
        let (_, env) = signed(&ledger);
        let coordinator = SubmissionCoordinator::new(ledger.clone(), Duration::from_millis(20));
        let mut m = signed_machine();

        match coordinator.run(Submission::Submit(&env), &mut m).await {
            Err(EngineError::StatusUnknown { hash, waited_ms }) => {
                assert_eq!(hash, env.hash());
                assert_eq!(waited_ms, 20);
            }
            other => panic!("expected StatusUnknown, got {:?}", other),
        }
        assert_eq!(m.state(), RunState::Aborted { stage: Stage::Submit });
    }

    /// Applies every submit, then fails the reply with the given error.
    struct LostReply {
        ledger: Arc<SandboxLedger>,
        error: NetworkError,
        apply: bool,
    }

    #[async_trait::async_trait]
    impl LedgerWriter for LostReply {
        async fn simulate(&self, op: &CanonicalOperation) -> Result<RawResponse, NetworkError> {
            self.ledger.simulate(op).await
        }

        async fn submit_and_wait(
            &self,
            envelope: &SignedEnvelope,
        ) -> Result<RawResponse, NetworkError> {
            if self.apply {
                self.ledger.submit_and_wait(envelope).await?;
            }
            Err(self.error.clone())
        }
    }

    #[tokio::test]
    async fn reset_after_delivery_is_status_unknown_not_retryable() {
        let ledger = Arc::new(SandboxLedger::new());
        let (op, env) = signed(&ledger);
        let before = ledger.sequence_of(&op.account()).unwrap();
        let writer = Arc::new(LostReply {
            ledger: ledger.clone(),
            error: NetworkError::Transport("connection reset by peer".into()),
            apply: true,
        });
        let coordinator = SubmissionCoordinator::new(writer, Duration::from_secs(5));
        let mut m = signed_machine();

        let err = coordinator.run(Submission::Submit(&env), &mut m).await.unwrap_err();
        match &err {
            EngineError::StatusUnknown { hash, .. } => assert_eq!(hash, env.hash()),
            other => panic!("expected StatusUnknown, got {:?}", other),
        }
        assert!(!err.is_retryable());

        // The ledger did apply it; the status lookup is the only safe follow-up.
        assert_eq!(ledger.sequence_of(&op.account()), Some(before + 1));
        assert!(ledger.status_of(env.hash()).found);
    }

    #[tokio::test]
    async fn unreadable_submit_reply_is_status_unknown() {
        let ledger = Arc::new(SandboxLedger::new());
        let (_, env) = signed(&ledger);
        let writer = Arc::new(LostReply {
            ledger: ledger.clone(),
            error: NetworkError::Malformed("submit_and_wait: EOF while parsing".into()),
            apply: true,
        });
        let coordinator = SubmissionCoordinator::new(writer, Duration::from_secs(5));
        let mut m = signed_machine();

        let err = coordinator.run(Submission::Submit(&env), &mut m).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::StatusUnknown);
    }

    #[tokio::test]
    async fn undelivered_submit_stays_a_retryable_network_error() {
        let ledger = Arc::new(SandboxLedger::new());
        let (op, env) = signed(&ledger);
        let before = ledger.sequence_of(&op.account());
        let writer = Arc::new(LostReply {
            ledger: ledger.clone(),
            error: NetworkError::Unreachable("connection refused".into()),
            apply: false,
        });
        let coordinator = SubmissionCoordinator::new(writer, Duration::from_secs(5));
        let mut m = signed_machine();

        let err = coordinator.run(Submission::Submit(&env), &mut m).await.unwrap_err();
        assert!(matches!(err, EngineError::Network(NetworkError::Unreachable(_))));
        assert!(err.is_retryable());
        assert_eq!(ledger.sequence_of(&op.account()), before);
    }
}
