//! # Pipeline
//!
//! [`Engine`] drives one draft through the whole lifecycle:
//!
//! ```text
//!   fetch context --> preflight (sync, then async) --> resolve signing plan
//!        --> build (fee scaled by the plan) --> affordability
//!        --> sign / aggregate --> simulate | submit --> classify
//! ```
//!
//! ## Ordering
//!
//! Runs for the same account are serialized by a per-account lock held from
//! the context fetch until the network call returns. A second run therefore
//! always fetches a sequence number that reflects the first run's submit.
//! Runs for different accounts proceed concurrently.
//!
//! Nothing is retried inside a run. A retry is a new run with a fresh
//! context.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::affordability::AffordabilityChecker;
use crate::authority::keystore::KeyProvider;
use crate::authority::SigningAuthorityResolver;
use crate::config::EngineConfig;
use crate::crypto::address::AccountId;
use crate::error::EngineError;
use crate::ledger::client::{LedgerReader, LedgerWriter, TransactionStatus};
use crate::ledger::context::{FetchPlan, LedgerContextFetcher};
use crate::metrics::PipelineMetrics;
use crate::outcome::{OutcomeEnvelope, SubmissionMode};
use crate::preflight::{PreflightValidator, ValidationIssue};
use crate::submission::{
    EventBus, PipelineEvent, RunStateMachine, Stage, Submission, SubmissionCoordinator,
};
use crate::transaction::builder::TransactionBuilder;
use crate::transaction::draft::{parse_address, OperationBody, OperationDraft};
use crate::transaction::types::AccountFlag;

pub struct Engine {
    reader: Arc<dyn LedgerReader>,
    fetcher: LedgerContextFetcher,
    preflight: PreflightValidator,
    resolver: SigningAuthorityResolver,
    coordinator: SubmissionCoordinator,
    events: EventBus,
    metrics: Option<Arc<PipelineMetrics>>,
    account_locks: DashMap<AccountId, Arc<Mutex<()>>>,
    config: EngineConfig,
}

impl Engine {
    /// Engine over a ledger that serves both reads and writes.
    pub fn new<L>(ledger: Arc<L>, keys: Arc<dyn KeyProvider>, config: EngineConfig) -> Self
    where
        L: LedgerReader + LedgerWriter + 'static,
    {
        Self::from_parts(ledger.clone(), ledger, keys, config)
    }

    pub fn from_parts(
        reader: Arc<dyn LedgerReader>,
        writer: Arc<dyn LedgerWriter>,
        keys: Arc<dyn KeyProvider>,
        config: EngineConfig,
    ) -> Self {
        Self {
            fetcher: LedgerContextFetcher::new(reader.clone(), &config),
            preflight: PreflightValidator::new(reader.clone()),
            resolver: SigningAuthorityResolver::new(keys),
            coordinator: SubmissionCoordinator::new(writer, config.submit_timeout()),
            events: EventBus::new(config.event_channel_capacity),
            metrics: None,
            account_locks: DashMap::new(),
            reader,
            config,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<PipelineMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.events.subscribe()
    }

    /// Dry-run `draft`. Consumes nothing on the ledger; the outcome is
    /// advisory and never final, even when the ledger would reject.
    pub async fn simulate(&self, draft: &OperationDraft) -> Result<OutcomeEnvelope, EngineError> {
        self.run(draft, SubmissionMode::Simulate).await
    }

    /// Sign, submit and wait for a verdict. An authoritative rejection is
    /// returned as [`EngineError::LedgerRejection`].
    pub async fn submit(&self, draft: &OperationDraft) -> Result<OutcomeEnvelope, EngineError> {
        self.run(draft, SubmissionMode::Submit).await
    }

    /// Look a transaction up by hash. The follow-up to `StatusUnknown`.
    pub async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, EngineError> {
        Ok(self.reader.transaction_status(hash).await?)
    }

    pub async fn run(
        &self,
        draft: &OperationDraft,
        mode: SubmissionMode,
    ) -> Result<OutcomeEnvelope, EngineError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();
        if let Some(m) = &self.metrics {
            m.record_run(mode);
        }

        let account = parse_address(&draft.account).map_err(|e| {
            let issues = vec![ValidationIssue::field("account", &e)];
            self.abort(run_id, Stage::Preflight, None, EngineError::Validation(issues))
        })?;

        let span = info_span!(
            "run",
            run_id = %run_id,
            account = %account,
            kind = %draft.kind(),
            mode = %mode,
        );
        let result = async {
            let lock = self.account_lock(account);
            let result = {
                let _guard = lock.lock().await;
                self.run_locked(run_id, account, draft, mode).await
            };
            drop(lock);
            self.release_account_lock(account);
            result
        }
        .instrument(span)
        .await;

        if let Some(m) = &self.metrics {
            m.observe_duration(mode, started.elapsed().as_secs_f64());
        }
        result
    }

    async fn run_locked(
        &self,
        run_id: Uuid,
        account: AccountId,
        draft: &OperationDraft,
        mode: SubmissionMode,
    ) -> Result<OutcomeEnvelope, EngineError> {
        self.events.progress(run_id, Stage::Fetch);
        let context = self
            .fetcher
            .fetch(&account, Self::fetch_plan(draft))
            .await
            .map_err(|e| self.abort(run_id, Stage::Fetch, None, e.into()))?;

        self.events.progress(run_id, Stage::Preflight);
        let issues = self
            .preflight
            .validate(draft, &context)
            .await
            .map_err(|e| self.abort(run_id, Stage::Preflight, None, e.into()))?;
        if !issues.is_empty() {
            return Err(self.abort(run_id, Stage::Preflight, None, EngineError::Validation(issues)));
        }

        self.events.progress(run_id, Stage::Resolve);
        let plan = self
            .resolver
            .resolve(draft, &context)
            .map_err(|e| self.abort(run_id, Stage::Resolve, None, e.into()))?;

        self.events.progress(run_id, Stage::Build);
        let op = TransactionBuilder::new(draft, &context)
            .fee_multiplier(plan.fee_multiplier())
            .ledger_offset(self.config.ledger_offset)
            .build()
            .map_err(|e| self.abort(run_id, Stage::Build, None, e.into()))?;
        let mut machine = RunStateMachine::built(run_id);

        self.events.progress(run_id, Stage::Affordability);
        AffordabilityChecker::check(&op, &context)
            .map_err(|e| self.abort(run_id, Stage::Affordability, Some(&mut machine), e.into()))?;

        self.events.progress(run_id, Stage::Sign);
        let envelope = self
            .resolver
            .sign(&plan, &op)
            .map_err(|e| self.abort(run_id, Stage::Sign, Some(&mut machine), e.into()))?;
        machine.mark_signed();

        let (stage, submission) = match mode {
            SubmissionMode::Simulate => (Stage::Simulate, Submission::Simulate(&op)),
            SubmissionMode::Submit => (Stage::Submit, Submission::Submit(&envelope)),
        };
        self.events.progress(run_id, stage);
        let outcome = self
            .coordinator
            .run(submission, &mut machine)
            .await
            .map_err(|e| self.abort(run_id, stage, None, e))?;

        self.events.progress(run_id, Stage::Classify);
        if let Some(m) = &self.metrics {
            m.record_outcome(mode, outcome.class);
        }
        info!(
            sequence = op.sequence(),
            ticket = ?op.ticket_sequence(),
            fee = op.fee().0,
            plan = plan.label(),
            hash = envelope.hash(),
            code = %outcome.engine_result_code,
            "run finished"
        );
        self.events.settled(run_id, account, &outcome);

        match mode {
            SubmissionMode::Simulate => Ok(outcome),
            SubmissionMode::Submit => outcome.into_result(),
        }
    }

    /// Conditional reads `draft` needs on top of the base snapshot.
    pub fn fetch_plan(draft: &OperationDraft) -> FetchPlan {
        let disables_master = matches!(
            draft.operation,
            OperationBody::AccountSet {
                set_flag: Some(AccountFlag::DisableMaster),
                ..
            }
        );
        FetchPlan {
            tickets: draft
                .ticket
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty()),
            signer_list: draft.signing.is_multisign()
                || disables_master
                || matches!(draft.operation, OperationBody::SignerListSet { .. }),
            trust_lines: !draft.operation.issued_inputs().is_empty(),
        }
    }

    fn account_lock(&self, account: AccountId) -> Arc<Mutex<()>> {
        self.account_locks.entry(account).or_default().clone()
    }

    /// Forget the account's lock once no run holds or waits on it, so the
    /// map only tracks accounts with runs in flight. A cancelled run leaves
    /// its entry for the next run on that account to clear.
    fn release_account_lock(&self, account: AccountId) {
        self.account_locks
            .remove_if(&account, |_, lock| Arc::strong_count(lock) == 1);
    }

    #[cfg(test)]
    pub(crate) fn tracked_accounts(&self) -> usize {
        self.account_locks.len()
    }

    fn abort(
        &self,
        run_id: Uuid,
        stage: Stage,
        machine: Option<&mut RunStateMachine>,
        error: EngineError,
    ) -> EngineError {
        if let Some(machine) = machine {
            machine.abort(stage);
        }
        if let Some(m) = &self.metrics {
            m.record_abort(stage);
        }
        warn!(
            run_id = %run_id,
            stage = %stage,
            kind = %error.kind(),
            error = %error,
            "run aborted"
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::transaction::draft::{AmountInput, SignerChoice, SigningPreference};

    fn draft(body: OperationBody, signing: SigningPreference) -> OperationDraft {
        OperationDraft::new(AccountId::from_bytes([1; 20]).to_address(), body, signing)
    }

    fn master() -> SigningPreference {
        SigningPreference::Master {
            key: KeyHandle::new("k"),
        }
    }

    #[test]
    fn plain_payment_fetches_only_the_base_set() {
        let d = draft(
            OperationBody::Payment {
                destination: AccountId::from_bytes([2; 20]).to_address(),
                amount: AmountInput::native("1"),
                destination_tag: None,
            },
            master(),
        );
        assert_eq!(Engine::fetch_plan(&d), FetchPlan::default());
    }

    #[test]
    fn ticket_and_issued_inputs_extend_the_plan() {
        let d = draft(
            OperationBody::TrustSet {
                limit: AmountInput::issued("100", "USD", AccountId::from_bytes([9; 20]).to_address()),
            },
            master(),
        )
        .with_ticket("7");
        let plan = Engine::fetch_plan(&d);
        assert!(plan.tickets);
        assert!(plan.trust_lines);
        assert!(!plan.signer_list);
    }

    #[test]
    fn signer_list_fetched_when_authority_depends_on_it() {
        let multi = draft(
            OperationBody::OfferCancel {
                offer_sequence: "1".into(),
            },
            SigningPreference::MultiSign {
                signers: vec![SignerChoice {
                    account: AccountId::from_bytes([3; 20]).to_address(),
                    key: KeyHandle::new("s"),
                }],
            },
        );
        assert!(Engine::fetch_plan(&multi).signer_list);

        let disable = draft(
            OperationBody::AccountSet {
                set_flag: Some(AccountFlag::DisableMaster),
                clear_flag: None,
                domain: None,
                transfer_rate: None,
            },
            master(),
        );
        assert!(Engine::fetch_plan(&disable).signer_list);
    }

    #[tokio::test]
    async fn account_locks_are_released_after_runs() {
        use crate::authority::keystore::InMemoryKeyStore;
        use crate::crypto::keys::KeyPair;
        use crate::ledger::sandbox::SandboxLedger;
        use crate::transaction::types::Drops;

        let ledger = Arc::new(SandboxLedger::new());
        let keys = Arc::new(InMemoryKeyStore::new());
        let pair = KeyPair::from_seed(&[1; 32]);
        let owner = pair.account_id();
        keys.insert(KeyHandle::new("k"), pair);
        ledger.fund(owner, Drops(100_000_000));
        ledger.fund(AccountId::from_bytes([2; 20]), Drops(100_000_000));
        let engine = Engine::new(ledger, keys, EngineConfig::default());

        let pay = OperationDraft::new(
            owner.to_address(),
            OperationBody::Payment {
                destination: AccountId::from_bytes([2; 20]).to_address(),
                amount: AmountInput::native("1"),
                destination_tag: None,
            },
            master(),
        );
        let (a, b) = tokio::join!(
            engine.run(&pay, SubmissionMode::Submit),
            engine.run(&pay, SubmissionMode::Submit),
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(engine.tracked_accounts(), 0);

        let bad = draft(
            OperationBody::OfferCancel {
                offer_sequence: "x".into(),
            },
            master(),
        );
        assert!(engine.run(&bad, SubmissionMode::Simulate).await.is_err());
        assert_eq!(engine.tracked_accounts(), 0);
    }
}
