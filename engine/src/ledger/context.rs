//! Per-run ledger snapshot and the concurrent fetcher that builds it.
//!
//! A [`LedgerContext`] is fetched fresh for every pipeline run and never
//! reused: the account sequence is the contended resource, and a stale one
//! means a rejected or double-spent operation. Only server-level reserve
//! parameters are cached, in an injected [`TtlCache`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use super::cache::TtlCache;
use super::client::{LedgerReader, NetworkError, ReserveInfo, ServerInfo, SignerList, TrustLine};
use crate::config::EngineConfig;
use crate::crypto::address::AccountId;
use crate::transaction::types::{AccountFlags, Drops};

/// Immutable snapshot of everything a run needs from the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerContext {
    pub account: AccountId,
    pub sequence: u32,
    pub balance: Drops,
    pub owner_count: u32,
    pub flags: AccountFlags,
    pub regular_key: Option<AccountId>,
    pub base_fee: Drops,
    /// Current ledger index; operations expire a fixed offset after it.
    pub expiration_horizon: u32,
    pub reserves: ReserveInfo,
    pub network_id: Option<u32>,
    /// Present only when the draft names a ticket.
    pub tickets: Option<Vec<u32>>,
    /// Present only for multi-signed drafts; inner `None` means no list.
    pub signer_list: Option<Option<SignerList>>,
    /// Present only when issued currency is involved.
    pub trust_lines: Option<Vec<TrustLine>>,
    pub fetched_at: DateTime<Utc>,
}

impl LedgerContext {
    /// The configured signer list, if it was fetched and exists.
    pub fn signers(&self) -> Option<&SignerList> {
        self.signer_list.as_ref().and_then(|l| l.as_ref())
    }

    pub fn has_ticket(&self, ticket: u32) -> bool {
        self.tickets.as_ref().is_some_and(|t| t.contains(&ticket))
    }

    #[cfg(test)]
    pub(crate) fn for_tests(account: AccountId) -> Self {
        use crate::config::{
            DEFAULT_BASE_FEE_DROPS, DEFAULT_RESERVE_BASE_DROPS, DEFAULT_RESERVE_INCREMENT_DROPS,
        };
        Self {
            account,
            sequence: 1,
            balance: Drops(100_000_000),
            owner_count: 0,
            flags: AccountFlags::default(),
            regular_key: None,
            base_fee: Drops(DEFAULT_BASE_FEE_DROPS),
            expiration_horizon: 10,
            reserves: ReserveInfo {
                base: Drops(DEFAULT_RESERVE_BASE_DROPS),
                increment: Drops(DEFAULT_RESERVE_INCREMENT_DROPS),
            },
            network_id: None,
            tickets: None,
            signer_list: None,
            trust_lines: None,
            fetched_at: Utc::now(),
        }
    }
}

/// Which conditional reads a run needs besides the base set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchPlan {
    pub tickets: bool,
    pub signer_list: bool,
    pub trust_lines: bool,
}

/// Issues the independent reads for a [`LedgerContext`] concurrently.
///
/// Any failing read fails the whole fetch; there is no partial context and
/// no retry here.
pub struct LedgerContextFetcher {
    reader: Arc<dyn LedgerReader>,
    server_cache: TtlCache<String, ServerInfo>,
    read_timeout: Duration,
}

impl LedgerContextFetcher {
    pub fn new(reader: Arc<dyn LedgerReader>, config: &EngineConfig) -> Self {
        Self {
            reader,
            server_cache: TtlCache::new(config.reserve_cache_ttl(), config.reserve_cache_capacity),
            read_timeout: config.read_timeout(),
        }
    }

    pub fn reader(&self) -> &Arc<dyn LedgerReader> {
        &self.reader
    }

    #[instrument(skip_all, fields(account = %account))]
    pub async fn fetch(
        &self,
        account: &AccountId,
        plan: FetchPlan,
    ) -> Result<LedgerContext, NetworkError> {
        let reader = self.reader.as_ref();

        let tickets = async {
            if plan.tickets {
                self.timed("account_tickets", reader.account_tickets(account))
                    .await
                    .map(Some)
            } else {
                Ok(None)
            }
        };
        let signer_list = async {
            if plan.signer_list {
                self.timed("account_signer_list", reader.signer_list(account))
                    .await
                    .map(Some)
            } else {
                Ok(None)
            }
        };
        let trust_lines = async {
            if plan.trust_lines {
                self.timed("account_lines", reader.account_lines(account))
                    .await
                    .map(Some)
            } else {
                Ok(None)
            }
        };

        let (info, fee, horizon, server, tickets, signer_list, trust_lines) = tokio::try_join!(
            self.timed("account_info", reader.account_info(account)),
            self.timed("fee", reader.fee()),
            self.timed("ledger_current", reader.current_ledger_index()),
            self.server_info(),
            tickets,
            signer_list,
            trust_lines,
        )?;

        debug!(
            sequence = info.sequence,
            base_fee = fee.base_fee.0,
            horizon,
            "ledger context fetched"
        );

        Ok(LedgerContext {
            account: info.account,
            sequence: info.sequence,
            balance: info.balance,
            owner_count: info.owner_count,
            flags: info.flags,
            regular_key: info.regular_key,
            base_fee: fee.base_fee,
            expiration_horizon: horizon,
            reserves: server.reserves,
            network_id: server.network_id,
            tickets,
            signer_list,
            trust_lines,
            fetched_at: Utc::now(),
        })
    }

    async fn server_info(&self) -> Result<ServerInfo, NetworkError> {
        let key = self.reader.endpoint();
        if let Some(info) = self.server_cache.get(&key) {
            return Ok(info);
        }
        let info = self
            .timed("server_info", self.reader.server_info())
            .await?;
        self.server_cache.insert(key, info);
        Ok(info)
    }

    async fn timed<T>(
        &self,
        method: &str,
        fut: impl Future<Output = Result<T, NetworkError>>,
    ) -> Result<T, NetworkError> {
        match tokio::time::timeout(self.read_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(NetworkError::Timeout {
                method: method.to_string(),
                after_ms: self.read_timeout.as_millis() as u64,
            }),
        }
    }
}
