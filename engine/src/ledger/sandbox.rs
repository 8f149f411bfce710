//! # Sandbox Ledger
//!
//! An in-memory ledger that enforces the rules the engine cares about:
//! authorization (master, regular key, multi-sign quorum), sequence and
//! ticket consumption, fees, reserves, destination tags and trust lines.
//! It answers with the same engine result codes a real server would.
//!
//! ## Apply order
//!
//! 1. Static checks (`tem`): malformed fields, self-payments, bad quorum.
//! 2. Expiration (`tefMAX_LEDGER`), source existence (`terNO_ACCOUNT`),
//!    fee floor (`telINSUF_FEE_P`).
//! 3. Authorization (`tef`/`tem`), skipped when simulating.
//! 4. Sequencing: `tefNO_TICKET`, `tefPAST_SEQ`, `terPRE_SEQ`.
//! 5. Fee payable (`terINSUF_FEE_B`).
//! 6. Effects. A `tec` result still charges the fee and consumes the
//!    sequence or ticket.
//!
//! Every successful or `tec` submit closes one ledger. Simulation applies
//! to a scratch copy of the state and never writes it back.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::client::{
    AccountInfo, FeeInfo, LedgerReader, LedgerWriter, NetworkError, RawResponse, ReserveInfo,
    ServerInfo, SignerList, TransactionStatus, TrustLine,
};
use crate::config::{
    DEFAULT_BASE_FEE_DROPS, DEFAULT_RESERVE_BASE_DROPS, DEFAULT_RESERVE_INCREMENT_DROPS,
    RIPPLE_EPOCH_OFFSET,
};
use crate::crypto::address::AccountId;
use crate::crypto::hash::sha512_half;
use crate::outcome::{codes, describe};
use crate::transaction::builder::{CanonicalOperation, OperationFields, Sequencing};
use crate::transaction::signing::{SignedEnvelope, SignedTransaction};
use crate::transaction::types::{
    AccountFlag, AccountFlags, Amount, CurrencyCode, Drops, IssuedAmount, IssuedValue,
};
use crate::transaction::verification::{verify_signatures, Authorization, VerificationError};

type Code = &'static str;

// ---------------------------------------------------------------------------
// Genesis
// ---------------------------------------------------------------------------

/// Initial state for a sandbox, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenesisConfig {
    pub base_fee: Drops,
    pub reserve_base: Drops,
    pub reserve_increment: Drops,
    pub network_id: Option<u32>,
    pub start_ledger: u32,
    pub accounts: Vec<GenesisAccount>,
}

impl Default for GenesisConfig {
    fn default() -> Self {
        Self {
            base_fee: Drops(DEFAULT_BASE_FEE_DROPS),
            reserve_base: Drops(DEFAULT_RESERVE_BASE_DROPS),
            reserve_increment: Drops(DEFAULT_RESERVE_INCREMENT_DROPS),
            network_id: None,
            start_ledger: 1,
            accounts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub account: AccountId,
    pub balance: Drops,
    #[serde(default)]
    pub flags: AccountFlags,
    #[serde(default)]
    pub regular_key: Option<AccountId>,
    #[serde(default)]
    pub signer_list: Option<SignerList>,
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct AccountRoot {
    balance: Drops,
    sequence: u32,
    owner_count: u32,
    flags: AccountFlags,
    regular_key: Option<AccountId>,
    signer_list: Option<SignerList>,
    tickets: BTreeSet<u32>,
    domain: Option<String>,
    transfer_rate: Option<u32>,
    minted: u32,
}

impl AccountRoot {
    fn new(balance: Drops, sequence: u32) -> Self {
        Self {
            balance,
            sequence,
            owner_count: 0,
            flags: AccountFlags::default(),
            regular_key: None,
            signer_list: None,
            tickets: BTreeSet::new(),
            domain: None,
            transfer_rate: None,
            minted: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LineKey {
    holder: AccountId,
    issuer: AccountId,
    currency: CurrencyCode,
}

#[derive(Debug, Clone)]
struct LineState {
    balance: IssuedValue,
    limit: IssuedValue,
}

#[derive(Debug, Clone)]
struct Escrow {
    destination: AccountId,
    amount: Drops,
    finish_after: Option<u32>,
    cancel_after: Option<u32>,
}

#[derive(Debug, Clone)]
struct Nft {
    owner: AccountId,
}

#[derive(Debug, Clone)]
struct SandboxState {
    ledger_index: u32,
    base_fee: Drops,
    reserves: ReserveInfo,
    network_id: Option<u32>,
    accounts: HashMap<AccountId, AccountRoot>,
    lines: HashMap<LineKey, LineState>,
    escrows: HashMap<(AccountId, u32), Escrow>,
    offers: HashSet<(AccountId, u32)>,
    nfts: HashMap<String, Nft>,
    history: HashMap<String, TransactionStatus>,
}

impl SandboxState {
    fn required_reserve(&self, owned: u32) -> Drops {
        self.reserves.required(owned).unwrap_or(Drops(u64::MAX))
    }

    /// Balance after the fee is still above the reserve for `owned` objects
    /// plus `extra` leaving the account.
    fn can_afford(&self, root: &AccountRoot, owned: u32, extra: Drops) -> bool {
        self.required_reserve(owned)
            .checked_add(extra)
            .is_some_and(|need| root.balance >= need)
    }
}

// ---------------------------------------------------------------------------
// SandboxLedger
// ---------------------------------------------------------------------------

/// In-memory ledger implementing both [`LedgerReader`] and [`LedgerWriter`].
pub struct SandboxLedger {
    name: String,
    state: RwLock<SandboxState>,
    submit_delay: Option<Duration>,
    write_calls: AtomicUsize,
}

impl Default for SandboxLedger {
    fn default() -> Self {
        Self::from_genesis(GenesisConfig::default())
    }
}

impl SandboxLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_genesis(genesis: GenesisConfig) -> Self {
        let start = genesis.start_ledger.max(1);
        let mut accounts = HashMap::new();
        for acct in genesis.accounts {
            let mut root = AccountRoot::new(acct.balance, start);
            root.flags = acct.flags;
            root.regular_key = acct.regular_key;
            if acct.signer_list.is_some() {
                root.owner_count += 1;
            }
            root.signer_list = acct.signer_list;
            accounts.insert(acct.account, root);
        }
        Self {
            name: "sandbox".to_string(),
            state: RwLock::new(SandboxState {
                ledger_index: start,
                base_fee: genesis.base_fee,
                reserves: ReserveInfo {
                    base: genesis.reserve_base,
                    increment: genesis.reserve_increment,
                },
                network_id: genesis.network_id,
                accounts,
                lines: HashMap::new(),
                escrows: HashMap::new(),
                offers: HashSet::new(),
                nfts: HashMap::new(),
                history: HashMap::new(),
            }),
            submit_delay: None,
            write_calls: AtomicUsize::new(0),
        }
    }

    /// Name used as the cache key for server info.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Hold every submit response for `delay` after applying it, emulating a
    /// slow validation round.
    pub fn with_submit_delay(mut self, delay: Duration) -> Self {
        self.submit_delay = Some(delay);
        self
    }

    // -- Test and genesis helpers ------------------------------------------

    /// Create or top up an account.
    pub fn fund(&self, account: AccountId, amount: Drops) {
        let mut state = self.state.write();
        let seq = state.ledger_index;
        let root = state
            .accounts
            .entry(account)
            .or_insert_with(|| AccountRoot::new(Drops::ZERO, seq));
        root.balance = root.balance.checked_add(amount).unwrap_or(Drops(u64::MAX));
    }

    pub fn set_flag(&self, account: &AccountId, flag: AccountFlag, on: bool) {
        if let Some(root) = self.state.write().accounts.get_mut(account) {
            root.flags.set(flag, on);
        }
    }

    pub fn set_regular_key(&self, account: &AccountId, key: Option<AccountId>) {
        if let Some(root) = self.state.write().accounts.get_mut(account) {
            root.regular_key = key;
        }
    }

    pub fn set_signer_list(&self, account: &AccountId, list: Option<SignerList>) {
        if let Some(root) = self.state.write().accounts.get_mut(account) {
            match (&root.signer_list, &list) {
                (None, Some(_)) => root.owner_count += 1,
                (Some(_), None) => root.owner_count = root.owner_count.saturating_sub(1),
                _ => {}
            }
            root.signer_list = list;
        }
    }

    pub fn set_owner_count(&self, account: &AccountId, count: u32) {
        if let Some(root) = self.state.write().accounts.get_mut(account) {
            root.owner_count = count;
        }
    }

    /// Add tickets directly, as if an earlier TicketCreate produced them.
    pub fn add_tickets(&self, account: &AccountId, tickets: &[u32]) {
        if let Some(root) = self.state.write().accounts.get_mut(account) {
            for t in tickets {
                if root.tickets.insert(*t) {
                    root.owner_count += 1;
                }
            }
        }
    }

    /// Set a trust line balance and limit directly.
    pub fn set_trust_line(&self, holder: AccountId, amount: &IssuedAmount, limit: IssuedValue) {
        let mut state = self.state.write();
        let key = LineKey {
            holder,
            issuer: amount.issuer,
            currency: amount.currency.clone(),
        };
        if !state.lines.contains_key(&key) {
            if let Some(root) = state.accounts.get_mut(&holder) {
                root.owner_count += 1;
            }
        }
        state.lines.insert(
            key,
            LineState {
                balance: amount.value,
                limit,
            },
        );
    }

    /// Close a ledger without applying anything.
    pub fn close_ledger(&self) {
        self.state.write().ledger_index += 1;
    }

    pub fn set_base_fee(&self, fee: Drops) {
        self.state.write().base_fee = fee;
    }

    pub fn balance_of(&self, account: &AccountId) -> Option<Drops> {
        self.state.read().accounts.get(account).map(|r| r.balance)
    }

    pub fn sequence_of(&self, account: &AccountId) -> Option<u32> {
        self.state.read().accounts.get(account).map(|r| r.sequence)
    }

    pub fn ledger_index(&self) -> u32 {
        self.state.read().ledger_index
    }

    /// Number of `simulate` and `submit_and_wait` calls received.
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::Relaxed)
    }

    /// Apply a signed blob. Exposed for the JSON-RPC node.
    pub fn submit_blob(&self, blob: &str) -> RawResponse {
        let envelope = match SignedEnvelope::open(blob) {
            Ok(env) => env,
            Err(e) => {
                let detail = json!({ "error": e.to_string() });
                return response(codes::TEM_MALFORMED, false, None, None, detail);
            }
        };
        self.apply_submit(&envelope)
    }

    fn apply_submit(&self, envelope: &SignedEnvelope) -> RawResponse {
        let mut state = self.state.write();
        let tx = envelope.transaction();
        let code = apply(&mut state, tx, Mode::Submit);
        let included = code == codes::TES_SUCCESS || code.starts_with("tec");

        let ledger_index = if included {
            let index = state.ledger_index;
            state.ledger_index += 1;
            state.history.insert(
                envelope.hash().to_string(),
                TransactionStatus {
                    hash: envelope.hash().to_string(),
                    found: true,
                    validated: true,
                    engine_result: Some(code.to_string()),
                    ledger_index: Some(index),
                },
            );
            Some(index)
        } else {
            None
        };

        info!(
            account = %tx.operation.account(),
            kind = %tx.operation.kind(),
            hash = envelope.hash(),
            code,
            "sandbox applied submit"
        );

        response(
            code,
            included,
            ledger_index,
            Some(envelope.hash().to_string()),
            json!({ "tx_json": tx }),
        )
    }

    /// Dry-run an unsigned operation against a scratch copy.
    pub fn simulate_operation(&self, operation: &CanonicalOperation) -> RawResponse {
        let mut scratch = self.state.read().clone();
        let tx = SignedTransaction {
            operation: operation.clone(),
            signing_pub_key: String::new(),
            txn_signature: None,
            signers: Vec::new(),
        };
        let code = apply(&mut scratch, &tx, Mode::Simulate);
        debug!(account = %operation.account(), code, "sandbox simulated");
        response(code, false, None, None, json!({ "tx_json": operation, "applied": false }))
    }

    pub fn status_of(&self, hash: &str) -> TransactionStatus {
        let key = hash.trim().to_ascii_uppercase();
        self.state
            .read()
            .history
            .get(&key)
            .cloned()
            .unwrap_or(TransactionStatus {
                hash: key,
                found: false,
                validated: false,
                engine_result: None,
                ledger_index: None,
            })
    }
}

fn response(
    code: Code,
    validated: bool,
    ledger_index: Option<u32>,
    hash: Option<String>,
    extra: serde_json::Value,
) -> RawResponse {
    let message = describe(code);
    let mut body = json!({
        "engine_result": code,
        "engine_result_message": message,
        "validated": validated,
    });
    if let (Some(obj), Some(extra)) = (body.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            obj.insert(k.clone(), v.clone());
        }
        if let Some(h) = &hash {
            obj.insert("hash".into(), json!(h));
        }
        if let Some(i) = ledger_index {
            obj.insert("ledger_index".into(), json!(i));
        }
    }
    RawResponse {
        engine_result: code.to_string(),
        validated,
        ledger_index,
        hash,
        message: Some(message),
        body,
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Simulate,
    Submit,
}

fn now_ledger_time() -> i64 {
    Utc::now().timestamp() - RIPPLE_EPOCH_OFFSET
}

fn apply(state: &mut SandboxState, tx: &SignedTransaction, mode: Mode) -> Code {
    let op = &tx.operation;
    let account = op.account();

    if let Err(code) = static_checks(op) {
        return code;
    }
    let Some(sequencing) = op.sequencing() else {
        return codes::TEM_SEQ_AND_TICKET;
    };
    if op.last_ledger_sequence() < state.ledger_index {
        return codes::TEF_MAX_LEDGER;
    }
    let Some(root) = state.accounts.get(&account) else {
        return codes::TER_NO_ACCOUNT;
    };

    let signer_count = tx.signers.len() as u64;
    let min_fee = state
        .base_fee
        .checked_mul(if signer_count > 0 { signer_count + 1 } else { 1 })
        .unwrap_or(Drops(u64::MAX));
    if op.fee() < min_fee {
        return codes::TEL_INSUF_FEE_P;
    }

    if mode == Mode::Submit {
        if let Err(code) = check_authorization(state, root, &account, tx) {
            return code;
        }
    }

    match sequencing {
        Sequencing::Ticket(t) if !root.tickets.contains(&t) => return codes::TEF_NO_TICKET,
        Sequencing::Sequence(s) if s < root.sequence => return codes::TEF_PAST_SEQ,
        Sequencing::Sequence(s) if s > root.sequence => return codes::TER_PRE_SEQ,
        _ => {}
    }
    if root.balance < op.fee() {
        return codes::TER_INSUF_FEE_B;
    }

    // Charge fee and consume the counter; these stick even for tec results.
    let consumed_seq = match sequencing {
        Sequencing::Sequence(s) => s,
        Sequencing::Ticket(t) => t,
    };
    if let Some(root) = state.accounts.get_mut(&account) {
        root.balance = Drops(root.balance.0 - op.fee().0);
        match sequencing {
            Sequencing::Sequence(_) => root.sequence += 1,
            Sequencing::Ticket(t) => {
                root.tickets.remove(&t);
                root.owner_count = root.owner_count.saturating_sub(1);
            }
        }
    }

    let mut scratch = state.clone();
    match apply_effects(&mut scratch, &account, consumed_seq, op.fields()) {
        Ok(()) => {
            *state = scratch;
            codes::TES_SUCCESS
        }
        Err(code) => code,
    }
}

fn static_checks(op: &CanonicalOperation) -> Result<(), Code> {
    let account = op.account();
    match op.fields() {
        OperationFields::Payment {
            destination,
            amount,
            ..
        } => {
            if *destination == account {
                return Err(codes::TEM_REDUNDANT);
            }
            if amount.is_zero() {
                return Err(codes::TEM_BAD_AMOUNT);
            }
        }
        OperationFields::TrustSet { limit_amount } => {
            if limit_amount.issuer == account {
                return Err(codes::TEM_DST_IS_SRC);
            }
        }
        OperationFields::EscrowCreate {
            destination: _,
            amount,
            finish_after,
            cancel_after,
            ..
        } => {
            if amount.is_zero() {
                return Err(codes::TEM_BAD_AMOUNT);
            }
            match (finish_after, cancel_after) {
                (None, None) => return Err(codes::TEM_BAD_EXPIRATION),
                (Some(f), Some(c)) if c <= f => return Err(codes::TEM_BAD_EXPIRATION),
                _ => {}
            }
        }
        OperationFields::OfferCreate {
            taker_pays,
            taker_gets,
            ..
        } => {
            if taker_pays.is_zero() || taker_gets.is_zero() {
                return Err(codes::TEM_BAD_AMOUNT);
            }
            if matches!((taker_pays, taker_gets), (Amount::Native(_), Amount::Native(_))) {
                return Err(codes::TEM_BAD_AMOUNT);
            }
        }
        OperationFields::AccountSet {
            set_flag,
            clear_flag,
            ..
        } => {
            if set_flag.is_some() && set_flag == clear_flag {
                return Err(codes::TEM_INVALID_FLAG);
            }
            for f in [set_flag, clear_flag].into_iter().flatten() {
                if AccountFlag::from_code(*f).is_none() {
                    return Err(codes::TEM_INVALID_FLAG);
                }
            }
        }
        OperationFields::SetRegularKey { regular_key } => {
            if *regular_key == Some(account) {
                return Err(codes::TEM_BAD_REGKEY);
            }
        }
        OperationFields::SignerListSet {
            signer_quorum,
            signer_entries,
        } => {
            let mut seen = BTreeSet::new();
            for e in signer_entries {
                if e.account == account || !seen.insert(e.account) || e.signer_weight == 0 {
                    return Err(codes::TEM_BAD_SIGNER);
                }
            }
            let total: u64 = signer_entries.iter().map(|e| e.signer_weight as u64).sum();
            if *signer_quorum == 0 || (*signer_quorum as u64) > total {
                return Err(codes::TEM_BAD_QUORUM);
            }
        }
        OperationFields::TicketCreate { ticket_count } => {
            if *ticket_count == 0 {
                return Err(codes::TEM_MALFORMED);
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_authorization(
    state: &SandboxState,
    root: &AccountRoot,
    account: &AccountId,
    tx: &SignedTransaction,
) -> Result<(), Code> {
    let auth = verify_signatures(tx).map_err(|e| match e {
        VerificationError::SignersUnsorted
        | VerificationError::DuplicateSigner(_)
        | VerificationError::MixedSigning => codes::TEM_BAD_SIGNER,
        _ => codes::TEM_BAD_SIGNATURE,
    })?;

    match auth {
        Authorization::Single(key) => {
            let key_account = key.account_id();
            if key_account == *account {
                if root.flags.disable_master {
                    return Err(codes::TEF_MASTER_DISABLED);
                }
                Ok(())
            } else if root.regular_key == Some(key_account) {
                Ok(())
            } else {
                Err(codes::TEF_BAD_AUTH)
            }
        }
        Authorization::Multi(signers) => {
            let list = root
                .signer_list
                .as_ref()
                .ok_or(codes::TEF_NOT_MULTI_SIGNING)?;
            let mut weight: u64 = 0;
            for (signer, key) in signers {
                let w = list.weight_of(&signer).ok_or(codes::TEF_BAD_SIGNATURE)?;
                let key_account = key.account_id();
                let authorized = if key_account == signer {
                    // A signer's master key works unless that account disabled it.
                    state
                        .accounts
                        .get(&signer)
                        .map_or(true, |r| !r.flags.disable_master)
                } else {
                    state
                        .accounts
                        .get(&signer)
                        .is_some_and(|r| r.regular_key == Some(key_account))
                };
                if !authorized {
                    return Err(codes::TEF_BAD_SIGNATURE);
                }
                weight += w as u64;
            }
            if weight < list.quorum as u64 {
                return Err(codes::TEF_BAD_QUORUM);
            }
            Ok(())
        }
    }
}

fn apply_effects(
    state: &mut SandboxState,
    account: &AccountId,
    consumed_seq: u32,
    fields: &OperationFields,
) -> Result<(), Code> {
    match fields {
        OperationFields::Payment {
            destination,
            amount,
            destination_tag,
        } => {
            let dest_exists = state.accounts.contains_key(destination);
            if dest_exists {
                let requires_tag = state.accounts[destination].flags.require_dest_tag;
                if requires_tag && destination_tag.is_none() {
                    return Err(codes::TEC_DST_TAG_NEEDED);
                }
            }
            match amount {
                Amount::Native(drops) => pay_native(state, account, destination, *drops),
                Amount::Issued(issued) => {
                    if !dest_exists {
                        return Err(codes::TEC_NO_DST);
                    }
                    pay_issued(state, account, destination, issued)
                }
            }
        }

        OperationFields::TrustSet { limit_amount } => {
            if !state.accounts.contains_key(&limit_amount.issuer) {
                return Err(codes::TEC_NO_DST);
            }
            let key = LineKey {
                holder: *account,
                issuer: limit_amount.issuer,
                currency: limit_amount.currency.clone(),
            };
            if let Some(line) = state.lines.get_mut(&key) {
                line.limit = limit_amount.value;
                return Ok(());
            }
            let root = &state.accounts[account];
            if !state.can_afford(root, root.owner_count + 1, Drops::ZERO) {
                return Err(codes::TEC_INSUF_RESERVE_LINE);
            }
            state.lines.insert(
                key,
                LineState {
                    balance: IssuedValue::ZERO,
                    limit: limit_amount.value,
                },
            );
            bump_owner(state, account, 1);
            Ok(())
        }

        OperationFields::EscrowCreate {
            destination,
            amount,
            finish_after,
            cancel_after,
            destination_tag,
        } => {
            let dest = state.accounts.get(destination).ok_or(codes::TEC_NO_DST)?;
            if dest.flags.require_dest_tag && destination_tag.is_none() {
                return Err(codes::TEC_DST_TAG_NEEDED);
            }
            let root = &state.accounts[account];
            if !state.can_afford(root, root.owner_count + 1, *amount) {
                return Err(codes::TEC_UNFUNDED);
            }
            debit(state, account, *amount);
            bump_owner(state, account, 1);
            state.escrows.insert(
                (*account, consumed_seq),
                Escrow {
                    destination: *destination,
                    amount: *amount,
                    finish_after: *finish_after,
                    cancel_after: *cancel_after,
                },
            );
            Ok(())
        }

        OperationFields::EscrowFinish {
            owner,
            offer_sequence,
        } => {
            let escrow = state
                .escrows
                .get(&(*owner, *offer_sequence))
                .cloned()
                .ok_or(codes::TEC_NO_TARGET)?;
            let now = now_ledger_time();
            if escrow.finish_after.is_some_and(|f| (f as i64) > now)
                || escrow.cancel_after.is_some_and(|c| (c as i64) <= now)
            {
                return Err(codes::TEC_NO_PERMISSION);
            }
            state.escrows.remove(&(*owner, *offer_sequence));
            credit(state, &escrow.destination, escrow.amount);
            bump_owner(state, owner, -1);
            Ok(())
        }

        OperationFields::EscrowCancel {
            owner,
            offer_sequence,
        } => {
            let escrow = state
                .escrows
                .get(&(*owner, *offer_sequence))
                .cloned()
                .ok_or(codes::TEC_NO_TARGET)?;
            if !escrow
                .cancel_after
                .is_some_and(|c| (c as i64) <= now_ledger_time())
            {
                return Err(codes::TEC_NO_PERMISSION);
            }
            state.escrows.remove(&(*owner, *offer_sequence));
            credit(state, owner, escrow.amount);
            bump_owner(state, owner, -1);
            Ok(())
        }

        OperationFields::OfferCreate { taker_gets, .. } => {
            let root = &state.accounts[account];
            if !state.can_afford(root, root.owner_count + 1, Drops::ZERO) {
                return Err(codes::TEC_INSUF_RESERVE_OFFER);
            }
            let funded = match taker_gets {
                Amount::Native(d) => root.balance >= *d,
                Amount::Issued(i) => {
                    i.issuer == *account
                        || line_balance(state, account, i) > IssuedValue::ZERO
                }
            };
            if !funded {
                return Err(codes::TEC_UNFUNDED_OFFER);
            }
            state.offers.insert((*account, consumed_seq));
            bump_owner(state, account, 1);
            Ok(())
        }

        OperationFields::OfferCancel { offer_sequence } => {
            if state.offers.remove(&(*account, *offer_sequence)) {
                bump_owner(state, account, -1);
            }
            Ok(())
        }

        OperationFields::AccountSet {
            set_flag,
            clear_flag,
            domain,
            transfer_rate,
        } => {
            let root = state.accounts.get(account).ok_or(codes::TER_NO_ACCOUNT)?;
            if *set_flag == Some(AccountFlag::DisableMaster.code())
                && root.regular_key.is_none()
                && root.signer_list.is_none()
            {
                return Err(codes::TEC_NO_ALTERNATIVE_KEY);
            }
            let root = state
                .accounts
                .get_mut(account)
                .ok_or(codes::TER_NO_ACCOUNT)?;
            if let Some(flag) = set_flag.and_then(AccountFlag::from_code) {
                root.flags.set(flag, true);
            }
            if let Some(flag) = clear_flag.and_then(AccountFlag::from_code) {
                root.flags.set(flag, false);
            }
            if domain.is_some() {
                root.domain = domain.clone();
            }
            if transfer_rate.is_some() {
                root.transfer_rate = *transfer_rate;
            }
            Ok(())
        }

        OperationFields::SetRegularKey { regular_key } => {
            let root = state
                .accounts
                .get_mut(account)
                .ok_or(codes::TER_NO_ACCOUNT)?;
            if regular_key.is_none() && root.flags.disable_master && root.signer_list.is_none() {
                return Err(codes::TEC_NO_ALTERNATIVE_KEY);
            }
            root.regular_key = *regular_key;
            Ok(())
        }

        OperationFields::SignerListSet {
            signer_quorum,
            signer_entries,
        } => {
            let root = &state.accounts[account];
            let is_new = root.signer_list.is_none();
            if is_new && !state.can_afford(root, root.owner_count + 1, Drops::ZERO) {
                return Err(codes::TEC_INSUFFICIENT_RESERVE);
            }
            if let Some(root) = state.accounts.get_mut(account) {
                root.signer_list = Some(SignerList {
                    quorum: *signer_quorum,
                    entries: signer_entries.clone(),
                });
            }
            if is_new {
                bump_owner(state, account, 1);
            }
            Ok(())
        }

        OperationFields::TicketCreate { ticket_count } => {
            let root = &state.accounts[account];
            if !state.can_afford(root, root.owner_count + ticket_count, Drops::ZERO) {
                return Err(codes::TEC_INSUFFICIENT_RESERVE);
            }
            if let Some(root) = state.accounts.get_mut(account) {
                let first = root.sequence;
                for t in first..first + ticket_count {
                    root.tickets.insert(t);
                }
                root.sequence += ticket_count;
                root.owner_count += ticket_count;
            }
            Ok(())
        }

        OperationFields::NFTokenMint { taxon, .. } => {
            let root = &state.accounts[account];
            if !state.can_afford(root, root.owner_count + 1, Drops::ZERO) {
                return Err(codes::TEC_INSUFFICIENT_RESERVE);
            }
            let minted = root.minted;
            let id = hex::encode_upper(sha512_half(&[
                &account.as_bytes()[..],
                &taxon.to_be_bytes(),
                &minted.to_be_bytes(),
            ]));
            state.nfts.insert(id, Nft { owner: *account });
            if let Some(root) = state.accounts.get_mut(account) {
                root.minted += 1;
            }
            bump_owner(state, account, 1);
            Ok(())
        }

        OperationFields::NFTokenBurn { token_id } => {
            match state.nfts.get(token_id) {
                Some(nft) if nft.owner == *account => {}
                _ => return Err(codes::TEC_NO_ENTRY),
            }
            state.nfts.remove(token_id);
            bump_owner(state, account, -1);
            Ok(())
        }
    }
}

fn pay_native(
    state: &mut SandboxState,
    from: &AccountId,
    to: &AccountId,
    amount: Drops,
) -> Result<(), Code> {
    if !state.accounts.contains_key(to) && amount < state.reserves.base {
        return Err(codes::TEC_NO_DST_INSUF_XRP);
    }
    let root = &state.accounts[from];
    if !state.can_afford(root, root.owner_count, amount) {
        return Err(codes::TEC_UNFUNDED_PAYMENT);
    }
    debit(state, from, amount);
    let seq = state.ledger_index;
    let dest = state
        .accounts
        .entry(*to)
        .or_insert_with(|| AccountRoot::new(Drops::ZERO, seq));
    dest.balance = dest.balance.checked_add(amount).unwrap_or(Drops(u64::MAX));
    Ok(())
}

fn line_balance(state: &SandboxState, holder: &AccountId, amount: &IssuedAmount) -> IssuedValue {
    state
        .lines
        .get(&LineKey {
            holder: *holder,
            issuer: amount.issuer,
            currency: amount.currency.clone(),
        })
        .map(|l| l.balance)
        .unwrap_or(IssuedValue::ZERO)
}

fn pay_issued(
    state: &mut SandboxState,
    from: &AccountId,
    to: &AccountId,
    amount: &IssuedAmount,
) -> Result<(), Code> {
    let key_for = |holder: AccountId| LineKey {
        holder,
        issuer: amount.issuer,
        currency: amount.currency.clone(),
    };

    // Take from the sender unless the sender issues the currency.
    if *from != amount.issuer {
        let line = state.lines.get(&key_for(*from)).ok_or(codes::TEC_PATH_DRY)?;
        if line.balance < amount.value {
            return Err(codes::TEC_PATH_PARTIAL);
        }
    }
    // Deliver to the receiver unless the receiver is the issuer.
    if *to != amount.issuer {
        let line = state.lines.get(&key_for(*to)).ok_or(codes::TEC_PATH_DRY)?;
        let after = line
            .balance
            .checked_add(amount.value)
            .ok_or(codes::TEC_PATH_DRY)?;
        if after > line.limit {
            return Err(codes::TEC_PATH_DRY);
        }
    }

    if *from != amount.issuer {
        if let Some(line) = state.lines.get_mut(&key_for(*from)) {
            line.balance = line
                .balance
                .checked_sub(amount.value)
                .unwrap_or(IssuedValue::ZERO);
        }
    }
    if *to != amount.issuer {
        if let Some(line) = state.lines.get_mut(&key_for(*to)) {
            line.balance = line.balance.checked_add(amount.value).unwrap_or(line.limit);
        }
    }
    Ok(())
}

fn debit(state: &mut SandboxState, account: &AccountId, amount: Drops) {
    if let Some(root) = state.accounts.get_mut(account) {
        root.balance = root.balance.checked_sub(amount).unwrap_or(Drops::ZERO);
    }
}

fn credit(state: &mut SandboxState, account: &AccountId, amount: Drops) {
    if let Some(root) = state.accounts.get_mut(account) {
        root.balance = root.balance.checked_add(amount).unwrap_or(Drops(u64::MAX));
    }
}

fn bump_owner(state: &mut SandboxState, account: &AccountId, delta: i64) {
    if let Some(root) = state.accounts.get_mut(account) {
        root.owner_count = (root.owner_count as i64 + delta).max(0) as u32;
    }
}

// ---------------------------------------------------------------------------
// Trait impls
// ---------------------------------------------------------------------------

#[async_trait]
impl LedgerReader for SandboxLedger {
    fn endpoint(&self) -> String {
        self.name.clone()
    }

    async fn account_info(&self, account: &AccountId) -> Result<AccountInfo, NetworkError> {
        let state = self.state.read();
        let root = state
            .accounts
            .get(account)
            .ok_or(NetworkError::AccountNotFound(*account))?;
        Ok(AccountInfo {
            account: *account,
            balance: root.balance,
            sequence: root.sequence,
            owner_count: root.owner_count,
            flags: root.flags,
            regular_key: root.regular_key,
        })
    }

    async fn fee(&self) -> Result<FeeInfo, NetworkError> {
        Ok(FeeInfo {
            base_fee: self.state.read().base_fee,
        })
    }

    async fn current_ledger_index(&self) -> Result<u32, NetworkError> {
        Ok(self.state.read().ledger_index)
    }

    async fn server_info(&self) -> Result<ServerInfo, NetworkError> {
        let state = self.state.read();
        Ok(ServerInfo {
            reserves: state.reserves,
            network_id: state.network_id,
        })
    }

    async fn account_tickets(&self, account: &AccountId) -> Result<Vec<u32>, NetworkError> {
        let state = self.state.read();
        let root = state
            .accounts
            .get(account)
            .ok_or(NetworkError::AccountNotFound(*account))?;
        Ok(root.tickets.iter().copied().collect())
    }

    async fn signer_list(&self, account: &AccountId) -> Result<Option<SignerList>, NetworkError> {
        let state = self.state.read();
        let root = state
            .accounts
            .get(account)
            .ok_or(NetworkError::AccountNotFound(*account))?;
        Ok(root.signer_list.clone())
    }

    async fn account_lines(&self, account: &AccountId) -> Result<Vec<TrustLine>, NetworkError> {
        let state = self.state.read();
        if !state.accounts.contains_key(account) {
            return Err(NetworkError::AccountNotFound(*account));
        }
        let mut lines = Vec::new();
        for (key, line) in &state.lines {
            if key.holder == *account {
                lines.push(TrustLine {
                    peer: key.issuer,
                    currency: key.currency.clone(),
                    balance: line.balance,
                    limit: line.limit,
                });
            } else if key.issuer == *account {
                lines.push(TrustLine {
                    peer: key.holder,
                    currency: key.currency.clone(),
                    balance: line.balance.negate(),
                    limit: IssuedValue::ZERO,
                });
            }
        }
        lines.sort_by(|a, b| (a.peer, &a.currency).cmp(&(b.peer, &b.currency)));
        Ok(lines)
    }

    async fn transaction_status(&self, hash: &str) -> Result<TransactionStatus, NetworkError> {
        Ok(self.status_of(hash))
    }
}

#[async_trait]
impl LedgerWriter for SandboxLedger {
    async fn simulate(&self, operation: &CanonicalOperation) -> Result<RawResponse, NetworkError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.simulate_operation(operation))
    }

    async fn submit_and_wait(
        &self,
        envelope: &SignedEnvelope,
    ) -> Result<RawResponse, NetworkError> {
        self.write_calls.fetch_add(1, Ordering::Relaxed);
        let response = self.apply_submit(envelope);
        if let Some(delay) = self.submit_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}
