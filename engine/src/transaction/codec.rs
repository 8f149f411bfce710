//! Canonical byte encoding and signing data.
//!
//! Signatures are computed over a deterministic, field-tagged binary form
//! of the operation rather than over JSON. Each present field is written as
//! `code (1 byte) || length (u32 BE) || value`, in ascending code order.
//! Absent optional fields are not written at all, so an omitted field and a
//! zero-valued one never encode the same way.

use super::builder::{CanonicalOperation, OperationFields};
use super::types::{Amount, CurrencyCode, Drops, IssuedAmount, Memo};
use crate::config::{PREFIX_MULTI_SIGN, PREFIX_SINGLE_SIGN};
use crate::crypto::address::AccountId;
use crate::crypto::keys::PublicKey;

// Field codes. Order here is encoding order.
const F_TRANSACTION_TYPE: u8 = 0x01;
const F_FLAGS: u8 = 0x02;
const F_SOURCE_TAG: u8 = 0x03;
const F_SEQUENCE: u8 = 0x04;
const F_DESTINATION_TAG: u8 = 0x05;
const F_EXPIRATION: u8 = 0x06;
const F_OFFER_SEQUENCE: u8 = 0x07;
const F_TRANSFER_RATE: u8 = 0x08;
const F_SET_FLAG: u8 = 0x09;
const F_CLEAR_FLAG: u8 = 0x0A;
const F_CANCEL_AFTER: u8 = 0x0B;
const F_FINISH_AFTER: u8 = 0x0C;
const F_SIGNER_QUORUM: u8 = 0x0D;
const F_TICKET_COUNT: u8 = 0x0E;
const F_TICKET_SEQUENCE: u8 = 0x0F;
const F_LAST_LEDGER_SEQUENCE: u8 = 0x10;
const F_TAXON: u8 = 0x11;
const F_TRANSFER_FEE: u8 = 0x12;
const F_TOKEN_ID: u8 = 0x20;
const F_AMOUNT: u8 = 0x21;
const F_LIMIT_AMOUNT: u8 = 0x22;
const F_TAKER_PAYS: u8 = 0x23;
const F_TAKER_GETS: u8 = 0x24;
const F_FEE: u8 = 0x25;
const F_SIGNING_PUB_KEY: u8 = 0x30;
const F_DOMAIN: u8 = 0x31;
const F_URI: u8 = 0x32;
const F_ACCOUNT: u8 = 0x40;
const F_OWNER: u8 = 0x41;
const F_DESTINATION: u8 = 0x42;
const F_REGULAR_KEY: u8 = 0x43;
const F_MEMOS: u8 = 0x50;
const F_SIGNER_ENTRIES: u8 = 0x51;

/// Length-prefixed field writer that keeps fields sorted by code.
struct FieldWriter {
    fields: Vec<(u8, Vec<u8>)>,
}

impl FieldWriter {
    fn new() -> Self {
        Self { fields: Vec::with_capacity(16) }
    }

    fn raw(&mut self, code: u8, value: Vec<u8>) {
        self.fields.push((code, value));
    }

    fn u32(&mut self, code: u8, value: u32) {
        self.raw(code, value.to_be_bytes().to_vec());
    }

    fn opt_u32(&mut self, code: u8, value: Option<u32>) {
        if let Some(v) = value {
            self.u32(code, v);
        }
    }

    fn account(&mut self, code: u8, id: &AccountId) {
        self.raw(code, id.as_bytes().to_vec());
    }

    fn hex_blob(&mut self, code: u8, hex_str: &str) {
        // Values reaching here were hex-encoded by the builder; fall back to
        // the raw text so a decoded foreign operation still encodes stably.
        let bytes = hex::decode(hex_str).unwrap_or_else(|_| hex_str.as_bytes().to_vec());
        self.raw(code, bytes);
    }

    fn amount(&mut self, code: u8, amount: &Amount) {
        self.raw(code, encode_amount(amount));
    }

    fn finish(mut self) -> Vec<u8> {
        // Stable sort keeps insertion order for repeated codes.
        self.fields.sort_by_key(|(code, _)| *code);
        let mut buf = Vec::with_capacity(256);
        for (code, value) in self.fields {
            buf.push(code);
            buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
            buf.extend_from_slice(&value);
        }
        buf
    }
}

fn encode_drops(drops: Drops) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(0x00);
    out.extend_from_slice(&drops.0.to_be_bytes());
    out
}

fn encode_currency(code: &CurrencyCode) -> [u8; 20] {
    match code {
        CurrencyCode::NonStandard(bytes) => *bytes,
        CurrencyCode::Standard(s) => {
            // Short codes occupy bytes 12..15 of the 20-byte form.
            let mut out = [0u8; 20];
            out[12..12 + s.len().min(3)].copy_from_slice(&s.as_bytes()[..s.len().min(3)]);
            out
        }
    }
}

fn encode_issued(amount: &IssuedAmount) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + 20 + 20 + 16);
    out.push(0x01);
    out.extend_from_slice(&encode_currency(&amount.currency));
    out.extend_from_slice(amount.issuer.as_bytes());
    out.extend_from_slice(amount.value.to_string().as_bytes());
    out
}

fn encode_amount(amount: &Amount) -> Vec<u8> {
    match amount {
        Amount::Native(d) => encode_drops(*d),
        Amount::Issued(i) => encode_issued(i),
    }
}

fn encode_memos(memos: &[Memo]) -> Vec<u8> {
    let mut out = Vec::new();
    for memo in memos {
        for part in [&memo.memo_type, &memo.memo_data, &memo.memo_format] {
            match part {
                Some(h) => {
                    let bytes = hex::decode(h).unwrap_or_else(|_| h.as_bytes().to_vec());
                    out.push(0x01);
                    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                    out.extend_from_slice(&bytes);
                }
                None => out.push(0x00),
            }
        }
    }
    out
}

fn write_fields(w: &mut FieldWriter, fields: &OperationFields) {
    match fields {
        OperationFields::Payment {
            destination,
            amount,
            destination_tag,
        } => {
            w.account(F_DESTINATION, destination);
            w.amount(F_AMOUNT, amount);
            w.opt_u32(F_DESTINATION_TAG, *destination_tag);
        }
        OperationFields::TrustSet { limit_amount } => {
            w.raw(F_LIMIT_AMOUNT, encode_issued(limit_amount));
        }
        OperationFields::EscrowCreate {
            destination,
            amount,
            finish_after,
            cancel_after,
            destination_tag,
        } => {
            w.account(F_DESTINATION, destination);
            w.raw(F_AMOUNT, encode_drops(*amount));
            w.opt_u32(F_FINISH_AFTER, *finish_after);
            w.opt_u32(F_CANCEL_AFTER, *cancel_after);
            w.opt_u32(F_DESTINATION_TAG, *destination_tag);
        }
        OperationFields::EscrowFinish {
            owner,
            offer_sequence,
        }
        | OperationFields::EscrowCancel {
            owner,
            offer_sequence,
        } => {
            w.account(F_OWNER, owner);
            w.u32(F_OFFER_SEQUENCE, *offer_sequence);
        }
        OperationFields::OfferCreate {
            taker_pays,
            taker_gets,
            expiration,
        } => {
            w.amount(F_TAKER_PAYS, taker_pays);
            w.amount(F_TAKER_GETS, taker_gets);
            w.opt_u32(F_EXPIRATION, *expiration);
        }
        OperationFields::OfferCancel { offer_sequence } => {
            w.u32(F_OFFER_SEQUENCE, *offer_sequence);
        }
        OperationFields::AccountSet {
            set_flag,
            clear_flag,
            domain,
            transfer_rate,
        } => {
            w.opt_u32(F_SET_FLAG, *set_flag);
            w.opt_u32(F_CLEAR_FLAG, *clear_flag);
            if let Some(d) = domain {
                w.hex_blob(F_DOMAIN, d);
            }
            w.opt_u32(F_TRANSFER_RATE, *transfer_rate);
        }
        OperationFields::SetRegularKey { regular_key } => {
            if let Some(k) = regular_key {
                w.account(F_REGULAR_KEY, k);
            }
        }
        OperationFields::SignerListSet {
            signer_quorum,
            signer_entries,
        } => {
            w.u32(F_SIGNER_QUORUM, *signer_quorum);
            let mut entries = Vec::with_capacity(signer_entries.len() * 22);
            for e in signer_entries {
                entries.extend_from_slice(e.account.as_bytes());
                entries.extend_from_slice(&e.signer_weight.to_be_bytes());
            }
            w.raw(F_SIGNER_ENTRIES, entries);
        }
        OperationFields::TicketCreate { ticket_count } => {
            w.u32(F_TICKET_COUNT, *ticket_count);
        }
        OperationFields::NFTokenMint {
            taxon,
            uri,
            transfer_fee,
            flags,
        } => {
            w.u32(F_TAXON, *taxon);
            if let Some(u) = uri {
                w.hex_blob(F_URI, u);
            }
            w.opt_u32(F_TRANSFER_FEE, transfer_fee.map(u32::from));
            if *flags != 0 {
                w.u32(F_FLAGS, *flags);
            }
        }
        OperationFields::NFTokenBurn { token_id } => {
            w.hex_blob(F_TOKEN_ID, token_id);
        }
    }
}

/// Canonical bytes of `op`. `signing_key` is the single-signer's key, or
/// `None` for the empty key used in multi-signing.
pub fn canonical_bytes(op: &CanonicalOperation, signing_key: Option<&PublicKey>) -> Vec<u8> {
    let mut w = FieldWriter::new();
    w.raw(F_TRANSACTION_TYPE, op.kind().as_str().as_bytes().to_vec());
    w.account(F_ACCOUNT, &op.account());
    w.raw(F_FEE, encode_drops(op.fee()));
    w.u32(F_SEQUENCE, op.sequence());
    w.opt_u32(F_TICKET_SEQUENCE, op.ticket_sequence());
    w.u32(F_LAST_LEDGER_SEQUENCE, op.last_ledger_sequence());
    w.opt_u32(F_SOURCE_TAG, op.source_tag());
    if !op.memos().is_empty() {
        w.raw(F_MEMOS, encode_memos(op.memos()));
    }
    w.raw(
        F_SIGNING_PUB_KEY,
        signing_key
            .map(|k| k.to_prefixed_bytes().to_vec())
            .unwrap_or_default(),
    );
    write_fields(&mut w, op.fields());
    w.finish()
}

/// Data a single signer (master or regular key) signs.
pub fn single_signing_data(op: &CanonicalOperation, signing_key: &PublicKey) -> Vec<u8> {
    let mut data = PREFIX_SINGLE_SIGN.to_vec();
    data.extend_from_slice(&canonical_bytes(op, Some(signing_key)));
    data
}

/// Data one multi-signer signs. Every signer sees the same operation bytes;
/// only the trailing signer account differs.
pub fn multi_signing_data(op: &CanonicalOperation, signer: &AccountId) -> Vec<u8> {
    let mut data = PREFIX_MULTI_SIGN.to_vec();
    data.extend_from_slice(&canonical_bytes(op, None));
    data.extend_from_slice(signer.as_bytes());
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authority::keystore::KeyHandle;
    use crate::crypto::keys::KeyPair;
    use crate::ledger::context::LedgerContext;
    use crate::transaction::builder::TransactionBuilder;
    use crate::transaction::draft::{
        AmountInput, MemoInput, OperationBody, OperationDraft, SigningPreference,
    };

    fn op_with(draft: OperationDraft) -> CanonicalOperation {
        let ctx = LedgerContext::for_tests(AccountId::from_bytes([1; 20]));
        TransactionBuilder::new(&draft, &ctx).build().unwrap()
    }

    fn payment(tag: Option<&str>) -> OperationDraft {
        OperationDraft::new(
            AccountId::from_bytes([1; 20]).to_address(),
            OperationBody::Payment {
                destination: AccountId::from_bytes([2; 20]).to_address(),
                amount: AmountInput::native("1"),
                destination_tag: tag.map(String::from),
            },
            SigningPreference::Master {
                key: KeyHandle::new("k"),
            },
        )
    }

    #[test]
    fn encoding_is_deterministic() {
        let op = op_with(payment(None));
        assert_eq!(canonical_bytes(&op, None), canonical_bytes(&op, None));
    }

    #[test]
    fn absent_and_zero_tags_encode_differently() {
        let absent = op_with(payment(None));
        let zero = op_with(payment(Some("0")));
        assert_ne!(canonical_bytes(&absent, None), canonical_bytes(&zero, None));
    }

    #[test]
    fn memo_changes_the_encoding() {
        let plain = op_with(payment(None));
        let memo = op_with(payment(None).with_memo(MemoInput::text("x")));
        assert_ne!(canonical_bytes(&plain, None), canonical_bytes(&memo, None));
    }

    #[test]
    fn signing_data_is_domain_separated() {
        let op = op_with(payment(None));
        let kp = KeyPair::from_seed(&[1; 32]);
        let single = single_signing_data(&op, &kp.public_key());
        let multi = multi_signing_data(&op, &kp.account_id());
        assert_eq!(&single[..4], b"STX\0");
        assert_eq!(&multi[..4], b"SMT\0");
        assert!(multi.ends_with(kp.account_id().as_bytes()));
    }

    #[test]
    fn multi_signing_data_differs_per_signer() {
        let op = op_with(payment(None));
        let a = multi_signing_data(&op, &AccountId::from_bytes([3; 20]));
        let b = multi_signing_data(&op, &AccountId::from_bytes([4; 20]));
        assert_eq!(a.len(), b.len());
        assert_ne!(a, b);
    }
}
