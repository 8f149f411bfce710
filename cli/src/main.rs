// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # ledgerflow
//!
//! Entry point for the `ledgerflow` binary.
//!
//! - `serve`    runs a sandbox ledger node on the JSON-RPC API
//! - `submit`   signs and submits a draft, waiting for validation
//! - `simulate` dry-runs a draft
//! - `status`   looks a transaction up by hash
//! - `keygen`   prints a fresh key pair
//! - `version`  prints build version information

mod api;
mod cli;
mod config;
mod logging;
mod metrics;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;

use ledgerflow::crypto::keys::KeyPair;
use ledgerflow::ledger::{JsonRpcLedger, SandboxLedger};
use ledgerflow::metrics::PipelineMetrics;
use ledgerflow::outcome::SubmissionMode;
use ledgerflow::submission::PipelineEvent;
use ledgerflow::{Engine, EngineError};

use cli::{Commands, LedgerflowCli};
use metrics::NodeMetrics;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = LedgerflowCli::parse();
    let level = &cli.log_level;
    logging::init_logging(
        &format!("ledgerflow={level},ledgerflow_cli={level},tower_http={level}"),
        cli.log_format.into(),
    );

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Submit(args) => run_draft(args, SubmissionMode::Submit).await,
        Commands::Simulate(args) => run_draft(args, SubmissionMode::Simulate).await,
        Commands::Status(args) => query_status(args).await,
        Commands::Keygen => keygen(),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Runs the sandbox node until SIGINT or SIGTERM.
async fn serve(args: cli::ServeArgs) -> Result<()> {
    let genesis = config::load_genesis(args.genesis.as_deref())?;
    let accounts = genesis.accounts.len();
    let ledger = Arc::new(SandboxLedger::from_genesis(genesis).with_name("sandbox"));

    let node_metrics = Arc::new(NodeMetrics::new().context("failed to register node metrics")?);
    node_metrics.ledger_index.set(i64::from(ledger.ledger_index()));

    let state = api::AppState {
        version: env!("CARGO_PKG_VERSION").to_string(),
        ledger,
        metrics: node_metrics,
    };
    let router = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind RPC listener on {}", args.listen))?;
    tracing::info!(listen = %args.listen, accounts, "sandbox node listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("sandbox node failed")?;

    tracing::info!("sandbox node stopped");
    Ok(())
}

/// Drives one draft through the engine against a remote node.
async fn run_draft(args: cli::RunArgs, mode: SubmissionMode) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;
    let keys = config::load_keys(&args.keys)?;
    let draft = config::load_draft(&args.draft)?;

    let client = JsonRpcLedger::new(&args.rpc_url, config.read_timeout(), config.submit_timeout())
        .with_context(|| format!("failed to build RPC client for {}", args.rpc_url))?;
    let pipeline_metrics =
        Arc::new(PipelineMetrics::new().context("failed to register pipeline metrics")?);
    let engine = Engine::new(Arc::new(client), Arc::new(keys), config)
        .with_metrics(Arc::clone(&pipeline_metrics));

    let progress = tokio::spawn(print_progress(engine.subscribe()));
    let result = engine.run(&draft, mode).await;
    drop(engine);
    let _ = progress.await;

    if args.print_metrics {
        print!("{}", pipeline_metrics.encode().context("failed to encode metrics")?);
    }

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(EngineError::LedgerRejection(outcome)) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            anyhow::bail!(
                "ledger rejected operation: {} ({})",
                outcome.engine_result_code,
                outcome.diagnostic
            )
        }
        Err(EngineError::StatusUnknown { hash, waited_ms }) => {
            eprintln!("no verdict after {waited_ms}ms; the operation may still be validated.");
            eprintln!("check it with: ledgerflow status {hash}");
            anyhow::bail!("status unknown for {hash}")
        }
        Err(e) => Err(anyhow::Error::new(e).context(format!("{} failed", mode))),
    }
}

/// Prints stage progress to stderr until the engine drops its event bus.
async fn print_progress(mut events: broadcast::Receiver<PipelineEvent>) {
    loop {
        match events.recv().await {
            Ok(PipelineEvent::Progress { stage, message, .. }) => {
                eprintln!("[{}] {}", stage, message);
            }
            Ok(PipelineEvent::Settled { outcome, .. }) => {
                eprintln!("[settled] {}", outcome.engine_result_code);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("progress printer lagged by {} events", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn query_status(args: cli::StatusArgs) -> Result<()> {
    let config = config::load_config(args.config.as_deref())?;
    let client = JsonRpcLedger::new(&args.rpc_url, config.read_timeout(), config.submit_timeout())
        .with_context(|| format!("failed to build RPC client for {}", args.rpc_url))?;
    let keys = Arc::new(ledgerflow::authority::InMemoryKeyStore::new());
    let engine = Engine::new(Arc::new(client), keys, config);

    let status = engine
        .transaction_status(&args.hash)
        .await
        .with_context(|| format!("status lookup for {} failed", args.hash))?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn keygen() -> Result<()> {
    let pair = KeyPair::generate();
    let out = serde_json::json!({
        "address": pair.account_id().to_address(),
        "public_key": pair.public_key().to_hex(),
        "secret": pair.secret_hex(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn print_version() {
    println!("ledgerflow {}", env!("CARGO_PKG_VERSION"));
    println!("rustc      {}", option_env!("RUSTC_VERSION").unwrap_or("unknown"));
}

/// Resolves on Ctrl+C or SIGTERM. A handler that fails to install never
/// fires; the other one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received, draining connections");
}
