// Signing and aggregation benchmarks.
//
// Covers key generation, single-signing a canonical operation, verifying a
// sealed envelope, and multi-signature aggregation at several signer counts.

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use ledgerflow::authority::{aggregate, sign_partial, InMemoryKeyStore, KeyHandle};
use ledgerflow::crypto::address::AccountId;
use ledgerflow::crypto::keys::KeyPair;
use ledgerflow::ledger::client::ReserveInfo;
use ledgerflow::ledger::LedgerContext;
use ledgerflow::transaction::{
    sign_single, verify_signatures, AccountFlags, AmountInput, CanonicalOperation, Drops,
    OperationBody, OperationDraft, SigningPreference, TransactionBuilder,
};

fn context(account: AccountId) -> LedgerContext {
    LedgerContext {
        account,
        sequence: 42,
        balance: Drops(1_000_000_000),
        owner_count: 0,
        flags: AccountFlags::default(),
        regular_key: None,
        base_fee: Drops(10),
        expiration_horizon: 1_000,
        reserves: ReserveInfo {
            base: Drops(1_000_000),
            increment: Drops(200_000),
        },
        network_id: None,
        tickets: None,
        signer_list: None,
        trust_lines: None,
        fetched_at: Utc::now(),
    }
}

fn operation(account: AccountId, fee_multiplier: u64) -> CanonicalOperation {
    let draft = OperationDraft::new(
        account.to_address(),
        OperationBody::Payment {
            destination: AccountId::from_bytes([7; 20]).to_address(),
            amount: AmountInput::native("12.5"),
            destination_tag: Some("99".into()),
        },
        SigningPreference::Master {
            key: KeyHandle::new("bench"),
        },
    );
    TransactionBuilder::new(&draft, &context(account))
        .fee_multiplier(fee_multiplier)
        .build()
        .expect("bench operation builds")
}

fn bench_keypair_generation(c: &mut Criterion) {
    c.bench_function("ed25519/keypair_generate", |b| {
        b.iter(KeyPair::generate);
    });
}

fn bench_sign_single(c: &mut Criterion) {
    let key = KeyPair::generate();
    let op = operation(key.account_id(), 1);

    c.bench_function("envelope/sign_single", |b| {
        b.iter(|| sign_single(&op, &key).expect("sign"));
    });
}

fn bench_verify_envelope(c: &mut Criterion) {
    let key = KeyPair::generate();
    let envelope = sign_single(&operation(key.account_id(), 1), &key).expect("sign");

    c.bench_function("envelope/verify", |b| {
        b.iter(|| verify_signatures(envelope.transaction()).expect("verify"));
    });
}

fn bench_aggregate(c: &mut Criterion) {
    let mut group = c.benchmark_group("multisign/aggregate");

    for size in [1u8, 2, 5, 8, 32] {
        let store = InMemoryKeyStore::new();
        let mut signers: Vec<(AccountId, KeyHandle)> = (0..size)
            .map(|i| {
                let handle = KeyHandle::new(format!("s{i}"));
                let account = store.generate(handle.clone()).account_id();
                (account, handle)
            })
            .collect();
        signers.sort_by_key(|(a, _)| *a);

        let op = operation(AccountId::from_bytes([1; 20]), size as u64 + 1);
        let partials: Vec<_> = signers
            .iter()
            .map(|(a, k)| sign_partial(&op, *a, k, &store).expect("partial"))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &partials, |b, partials| {
            b.iter(|| aggregate(&op, partials.clone()).expect("aggregate"));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_keypair_generation,
    bench_sign_single,
    bench_verify_envelope,
    bench_aggregate,
);
criterion_main!(benches);
