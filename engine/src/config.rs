//! # Protocol Constants & Engine Configuration
//!
//! Every magic number the engine relies on lives here. The constants mirror
//! what the ledger itself enforces; [`EngineConfig`] holds the knobs an
//! operator may reasonably want to turn.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Native currency
// ---------------------------------------------------------------------------

/// Atomic units ("drops") per whole native coin.
pub const DROPS_PER_COIN: u64 = 1_000_000;

/// Maximum fractional digits accepted in a native amount typed by a user.
pub const NATIVE_DECIMALS: usize = 6;

/// Currency code reserved for the native coin. Never valid as an issued code.
pub const NATIVE_CURRENCY: &str = "XRP";

/// Fractional digits kept for issued-currency values.
pub const ISSUED_DECIMALS: u32 = 15;

/// Total supply ceiling for native amounts: 100 billion coins.
pub const MAX_NATIVE_DROPS: u64 = 100_000_000_000 * DROPS_PER_COIN;

// ---------------------------------------------------------------------------
// Sequencing and expiration
// ---------------------------------------------------------------------------

/// Value written to `Sequence` when a ticket is consumed instead.
pub const SEQUENCE_UNUSED: u32 = 0;

/// Ledgers added to the expiration horizon to form `LastLedgerSequence`.
/// Roughly a minute and a half of closes at 3-4s per ledger.
pub const LEDGER_OFFSET: u32 = 20;

/// Seconds between the Unix epoch and the ledger epoch (2000-01-01T00:00:00Z).
pub const RIPPLE_EPOCH_OFFSET: i64 = 946_684_800;

// ---------------------------------------------------------------------------
// Fees and reserves
// ---------------------------------------------------------------------------

/// Reference base fee in drops when the server does not report one.
pub const DEFAULT_BASE_FEE_DROPS: u64 = 10;

/// Default account reserve in drops (1 coin).
pub const DEFAULT_RESERVE_BASE_DROPS: u64 = 1_000_000;

/// Default per-object owner reserve in drops (0.2 coin).
pub const DEFAULT_RESERVE_INCREMENT_DROPS: u64 = 200_000;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Maximum total bytes across all memo fields of one operation.
pub const MAX_MEMO_BYTES: usize = 1024;

/// Maximum entries in a signer list.
pub const MAX_SIGNERS: usize = 32;

/// Maximum tickets created by one TicketCreate.
pub const MAX_TICKETS_PER_CREATE: u32 = 250;

/// Maximum NFT transfer fee, in 1/100000 units (50%).
pub const MAX_NFT_TRANSFER_FEE: u16 = 50_000;

/// Maximum domain length in bytes (before hex encoding).
pub const MAX_DOMAIN_BYTES: usize = 256;

/// Maximum NFT URI length in bytes (before hex encoding).
pub const MAX_URI_BYTES: usize = 256;

/// `TransferRate` bounds: 1.0 (no fee, encoded as 1e9) to 2.0.
pub const TRANSFER_RATE_MIN: u32 = 1_000_000_000;
pub const TRANSFER_RATE_MAX: u32 = 2_000_000_000;

// ---------------------------------------------------------------------------
// Hash and signing prefixes
// ---------------------------------------------------------------------------

/// Prefix for single-signature signing data (`STX\0`).
pub const PREFIX_SINGLE_SIGN: [u8; 4] = *b"STX\0";

/// Prefix for multi-signature signing data (`SMT\0`).
pub const PREFIX_MULTI_SIGN: [u8; 4] = *b"SMT\0";

/// Prefix for transaction id hashing (`TXN\0`).
pub const PREFIX_TRANSACTION_ID: [u8; 4] = *b"TXN\0";

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Runtime configuration for the engine.
///
/// Every field has a default, so an empty TOML table is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ledgers added to the expiration horizon.
    pub ledger_offset: u32,

    /// How long `submit_and_wait` may block before the outcome is reported
    /// as status-unknown.
    pub submit_timeout_ms: u64,

    /// Per-call timeout for read queries.
    pub read_timeout_ms: u64,

    /// Time-to-live for cached reserve parameters.
    pub reserve_cache_ttl_secs: u64,

    /// Maximum endpoints kept in the reserve cache.
    pub reserve_cache_capacity: usize,

    /// Capacity of the pipeline event broadcast channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ledger_offset: LEDGER_OFFSET,
            submit_timeout_ms: 30_000,
            read_timeout_ms: 10_000,
            reserve_cache_ttl_secs: 300,
            reserve_cache_capacity: 16,
            event_channel_capacity: 256,
        }
    }
}

impl EngineConfig {
    /// Submit timeout as a `Duration`.
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }

    /// Read timeout as a `Duration`.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Reserve cache TTL as a `Duration`.
    pub fn reserve_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.reserve_cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixes_are_distinct() {
        assert_ne!(PREFIX_SINGLE_SIGN, PREFIX_MULTI_SIGN);
        assert_ne!(PREFIX_SINGLE_SIGN, PREFIX_TRANSACTION_ID);
        assert_ne!(PREFIX_MULTI_SIGN, PREFIX_TRANSACTION_ID);
    }

    #[test]
    fn reserve_defaults_sanity() {
        assert!(DEFAULT_RESERVE_INCREMENT_DROPS < DEFAULT_RESERVE_BASE_DROPS);
        assert!(DEFAULT_BASE_FEE_DROPS < DEFAULT_RESERVE_INCREMENT_DROPS);
    }

    #[test]
    fn transfer_rate_bounds_ordered() {
        assert!(TRANSFER_RATE_MIN < TRANSFER_RATE_MAX);
    }

    #[test]
    fn default_config_uses_protocol_offset() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.ledger_offset, LEDGER_OFFSET);
        assert!(cfg.read_timeout() < cfg.submit_timeout());
    }

    #[test]
    fn partial_json_config_fills_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"submit_timeout_ms": 5}"#).unwrap();
        assert_eq!(cfg.submit_timeout_ms, 5);
        assert_eq!(cfg.ledger_offset, LEDGER_OFFSET);
    }
}
