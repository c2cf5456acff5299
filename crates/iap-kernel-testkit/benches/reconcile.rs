//! Reconciliation throughput over large entitlement snapshots.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use iap_kernel_core::{ProductKind, Transaction, TransactionBuilder};
use iap_kernel_store::EntitlementStore;
use iap_kernel_sync::{MemoryLedger, Reconciler};

fn snapshot(products: usize) -> Vec<Transaction> {
    (0..products as u64)
        .map(|i| {
            let tx = TransactionBuilder::new(i + 1, format!("product_{i}"))
                .kind(ProductKind::NonConsumable)
                .purchased_at(1_000 + i as i64)
                .build();
            if i % 10 == 0 {
                tx.revoked_at(10_000 + i as i64)
            } else {
                tx
            }
        })
        .collect()
}

fn bench_store_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_merge");
    for size in [100usize, 1_000, 10_000] {
        let records = snapshot(size);

        group.bench_with_input(BenchmarkId::new("fresh", size), &records, |b, records| {
            b.iter(|| {
                let store = EntitlementStore::new();
                black_box(store.reconcile(records))
            })
        });

        let warm = EntitlementStore::new();
        warm.reconcile(&records);
        group.bench_with_input(BenchmarkId::new("replay", size), &records, |b, records| {
            b.iter(|| black_box(warm.reconcile(records)))
        });
    }
    group.finish();
}

fn bench_full_pass(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime");

    let mut group = c.benchmark_group("reconcile_pass");
    for size in [100usize, 1_000] {
        let ledger = MemoryLedger::new();
        for i in 0..size {
            ledger.grant(format!("product_{i}"), ProductKind::NonConsumable);
        }
        let reconciler = Reconciler::new(ledger, Arc::new(EntitlementStore::new()));

        group.bench_function(BenchmarkId::from_parameter(size), |b| {
            b.iter(|| {
                runtime
                    .block_on(reconciler.reconcile())
                    .expect("reconcile")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_store_merge, bench_full_pass);
criterion_main!(benches);
