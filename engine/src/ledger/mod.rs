//! # Ledger Module
//!
//! Everything the engine reads from or writes to a ledger server.
//!
//! ## Architecture
//!
//! ```text
//! client.rs  : LedgerReader / LedgerWriter traits and their data types
//! context.rs : LedgerContext snapshot and the concurrent fetcher
//! cache.rs   : TTL cache for server-level reserve parameters
//! rpc.rs     : JSON-RPC wire types and the HTTP client (reqwest)
//! sandbox.rs : In-memory ledger enforcing auth, sequencing and reserves
//! ```
//!
//! ## Design Decisions
//!
//! - The engine only ever talks to `dyn LedgerReader` / `dyn LedgerWriter`,
//!   so the sandbox and the HTTP client are interchangeable.
//! - Account state is never cached. Only reserves are, keyed by endpoint.

pub mod cache;
pub mod client;
pub mod context;
pub mod rpc;
pub mod sandbox;

pub use cache::TtlCache;
pub use client::{
    AccountInfo, FeeInfo, LedgerReader, LedgerWriter, NetworkError, RawResponse, ReserveInfo,
    ServerInfo, SignerList, TransactionStatus, TrustLine,
};
pub use context::{FetchPlan, LedgerContext, LedgerContextFetcher};
pub use rpc::{JsonRpcLedger, RpcError, RpcMethod, RpcRequest, RpcResponse};
pub use sandbox::{GenesisAccount, GenesisConfig, SandboxLedger};
