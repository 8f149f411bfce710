//! # CLI Interface
//!
//! Command-line structure for the `ledgerflow` binary, using `clap` derive.
//! Every flag that points at an endpoint or file can also come from a
//! `LEDGERFLOW_*` environment variable.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::logging::LogFormat;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:5005";
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:5005/";

/// Build, authorize and submit ledger operations.
#[derive(Parser, Debug)]
#[command(
    name = "ledgerflow",
    about = "Transaction lifecycle engine and sandbox ledger node",
    version,
    propagate_version = true
)]
pub struct LedgerflowCli {
    /// Default log filter when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "LEDGERFLOW_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, env = "LEDGERFLOW_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Pretty)]
    pub log_format: LogFormatArg,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a sandbox ledger node serving the JSON-RPC API.
    Serve(ServeArgs),
    /// Sign and submit a draft, waiting for validation.
    Submit(RunArgs),
    /// Dry-run a draft. Nothing is consumed on the ledger.
    Simulate(RunArgs),
    /// Look up a transaction by hash.
    Status(StatusArgs),
    /// Print a fresh key pair and its address.
    Keygen,
    /// Print version information and exit.
    Version,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "LEDGERFLOW_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: String,

    /// Genesis JSON seeding accounts, fees and reserves.
    #[arg(long, env = "LEDGERFLOW_GENESIS")]
    pub genesis: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Draft JSON file.
    pub draft: PathBuf,

    #[arg(long, env = "LEDGERFLOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// JSON object mapping key handles to hex secrets.
    #[arg(long, env = "LEDGERFLOW_KEYS")]
    pub keys: PathBuf,

    /// Engine configuration (TOML). Defaults apply when omitted.
    #[arg(long, short = 'c', env = "LEDGERFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print pipeline metrics after the run.
    #[arg(long)]
    pub print_metrics: bool,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Transaction hash, hex.
    pub hash: String,

    #[arg(long, env = "LEDGERFLOW_RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    #[arg(long, short = 'c', env = "LEDGERFLOW_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        LedgerflowCli::command().debug_assert();
    }

    #[test]
    fn submit_parses_paths_and_flags() {
        let cli = LedgerflowCli::try_parse_from([
            "ledgerflow",
            "--log-format",
            "json",
            "submit",
            "draft.json",
            "--keys",
            "keys.json",
            "--print-metrics",
        ])
        .unwrap();
        assert_eq!(cli.log_format, LogFormatArg::Json);
        match cli.command {
            Commands::Submit(args) => {
                assert_eq!(args.draft, PathBuf::from("draft.json"));
                assert_eq!(args.keys, PathBuf::from("keys.json"));
                assert!(args.print_metrics);
                assert!(args.config.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
