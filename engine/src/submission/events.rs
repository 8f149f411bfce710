//! Progress and settlement events for the presentation layer.
//!
//! Events go out on a `tokio::sync::broadcast` channel. Publishing never
//! blocks a run and having no subscriber is fine; a slow subscriber lags
//! and loses the oldest events instead of holding up the pipeline.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

use super::state::Stage;
use crate::crypto::address::AccountId;
use crate::outcome::OutcomeEnvelope;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// Emitted at every stage transition.
    Progress {
        run_id: Uuid,
        stage: Stage,
        message: String,
    },
    /// Emitted once the outcome is known, just before the run returns it.
    /// Consumers refresh balances and listings from here.
    Settled {
        run_id: Uuid,
        account: AccountId,
        hash: Option<String>,
        outcome: Box<OutcomeEnvelope>,
    },
}

impl PipelineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::Progress { run_id, .. } | Self::Settled { run_id, .. } => *run_id,
        }
    }
}

/// Cloneable publisher.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }

    pub fn progress(&self, run_id: Uuid, stage: Stage) {
        self.publish(PipelineEvent::Progress {
            run_id,
            stage,
            message: stage.message().to_string(),
        });
    }

    pub fn settled(&self, run_id: Uuid, account: AccountId, outcome: &OutcomeEnvelope) {
        self.publish(PipelineEvent::Settled {
            run_id,
            account,
            hash: outcome.transaction_hash.clone(),
            outcome: Box::new(outcome.clone()),
        });
    }

    fn publish(&self, event: PipelineEvent) {
        if self.tx.send(event).is_err() {
            trace!("no event subscribers");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_progress_in_order() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let id = Uuid::new_v4();
        bus.progress(id, Stage::Fetch);
        bus.progress(id, Stage::Build);

        match rx.recv().await.unwrap() {
            PipelineEvent::Progress { stage, message, .. } => {
                assert_eq!(stage, Stage::Fetch);
                assert_eq!(message, "fetching account state");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(rx.recv().await.unwrap().run_id(), id);
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new(1);
        bus.progress(Uuid::new_v4(), Stage::Sign);
        bus.progress(Uuid::new_v4(), Stage::Submit);
    }
}
