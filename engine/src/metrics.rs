//! # Pipeline Metrics
//!
//! Prometheus counters and a duration histogram for pipeline runs, kept in
//! a dedicated [`Registry`] under the `ledgerflow` namespace. Hosts that
//! already own a registry pass it to [`PipelineMetrics::with_registry`].

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::outcome::{ResultClass, SubmissionMode};
use crate::submission::Stage;

pub const NAMESPACE: &str = "ledgerflow";

#[derive(Clone)]
pub struct PipelineMetrics {
    registry: Registry,
    /// Runs started, by mode.
    runs_total: IntCounterVec,
    /// Classified outcomes, by mode and class.
    outcomes_total: IntCounterVec,
    /// Runs that ended without a ledger verdict, by stage.
    aborts_total: IntCounterVec,
    run_duration_seconds: HistogramVec,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        Self::with_registry(Registry::new_custom(Some(NAMESPACE.into()), None)?)
    }

    pub fn with_registry(registry: Registry) -> Result<Self, prometheus::Error> {
        let runs_total = IntCounterVec::new(
            Opts::new("pipeline_runs_total", "Pipeline runs started"),
            &["mode"],
        )?;
        registry.register(Box::new(runs_total.clone()))?;

        let outcomes_total = IntCounterVec::new(
            Opts::new("pipeline_outcomes_total", "Classified pipeline outcomes"),
            &["mode", "class"],
        )?;
        registry.register(Box::new(outcomes_total.clone()))?;

        let aborts_total = IntCounterVec::new(
            Opts::new(
                "pipeline_aborts_total",
                "Pipeline runs stopped before a ledger verdict",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(aborts_total.clone()))?;

        let run_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pipeline_run_duration_seconds",
                "Wall time of a pipeline run, fetch to classification",
            )
            .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["mode"],
        )?;
        registry.register(Box::new(run_duration_seconds.clone()))?;

        Ok(Self {
            registry,
            runs_total,
            outcomes_total,
            aborts_total,
            run_duration_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_run(&self, mode: SubmissionMode) {
        self.runs_total.with_label_values(&[mode_label(mode)]).inc();
    }

    pub fn record_outcome(&self, mode: SubmissionMode, class: ResultClass) {
        self.outcomes_total
            .with_label_values(&[mode_label(mode), class.as_str()])
            .inc();
    }

    pub fn record_abort(&self, stage: Stage) {
        self.aborts_total.with_label_values(&[stage.as_str()]).inc();
    }

    pub fn observe_duration(&self, mode: SubmissionMode, seconds: f64) {
        self.run_duration_seconds
            .with_label_values(&[mode_label(mode)])
            .observe(seconds);
    }

    /// Prometheus text exposition of everything in the registry.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        encode_registry(&self.registry)
    }
}

pub fn encode_registry(registry: &Registry) -> Result<String, prometheus::Error> {
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

fn mode_label(mode: SubmissionMode) -> &'static str {
    match mode {
        SubmissionMode::Simulate => "simulate",
        SubmissionMode::Submit => "submit",
    }
}
