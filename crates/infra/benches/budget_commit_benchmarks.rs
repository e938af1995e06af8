use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use procureflow_core::{BusinessId, OutletId, UserId};
use procureflow_infra::{EngineConfig, InMemoryEngine, NewPartner, ProcurementEngine};
use procureflow_purchasing::{Actor, BusinessRef, OrderDraft, OrderLine, Role, SupplierRef};
use rust_decimal::Decimal;

const CATEGORY: &str = "Dairy";

fn engine() -> InMemoryEngine {
    // Contended groups need more room than the default retry budget.
    let config = EngineConfig {
        commit_retry_limit: 10_000,
        ..EngineConfig::default()
    };
    ProcurementEngine::in_memory(config).unwrap()
}

fn configured(engine: &InMemoryEngine) -> BusinessId {
    let business_id = BusinessId::new();
    engine
        .budget()
        .configure(business_id, CATEGORY, Decimal::new(1_000_000_000_000, 0), "2026-10")
        .unwrap();
    business_id
}

fn supplier(engine: &InMemoryEngine, business_id: BusinessId) -> SupplierRef {
    let row = engine
        .register_partner(business_id, NewPartner::new("Toko Pak Harun", CATEGORY))
        .unwrap();
    engine.supplier(business_id, &row.partner_id).unwrap()
}

/// Single writer: a commit replays the envelope's whole history first.
fn bench_commit_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_commit_latency");

    for prior in [0u64, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("prior_commits", prior), prior, |b, &prior| {
            let engine = engine();
            let business_id = configured(&engine);
            for i in 0..prior {
                engine
                    .budget()
                    .commit(business_id, CATEGORY, Decimal::ONE, &format!("PO-SEED-{i}"))
                    .unwrap();
            }

            let counter = AtomicU64::new(0);
            b.iter(|| {
                let n = counter.fetch_add(1, Ordering::Relaxed);
                black_box(
                    engine
                        .budget()
                        .commit(business_id, CATEGORY, black_box(Decimal::ONE), &format!("PO-{n}"))
                        .unwrap(),
                );
            });
        });
    }

    group.finish();
}

/// Several writers racing on one envelope; every commit must land.
fn bench_contended_commits(c: &mut Criterion) {
    let mut group = c.benchmark_group("budget_contended_commits");

    for writers in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(*writers as u64));
        group.bench_with_input(BenchmarkId::new("writers", writers), writers, |b, &writers| {
            let engine = engine();
            let business_id = configured(&engine);
            let counter = AtomicU64::new(0);

            b.iter(|| {
                thread::scope(|s| {
                    for _ in 0..writers {
                        let n = counter.fetch_add(1, Ordering::Relaxed);
                        let engine = &engine;
                        s.spawn(move || {
                            engine
                                .budget()
                                .commit(business_id, CATEGORY, Decimal::ONE, &format!("PO-{n}"))
                                .unwrap();
                        });
                    }
                });
            });
        });
    }

    group.finish();
}

/// Submit through the engine: advisories, order commit, budget commit, dispatch.
fn bench_submit_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_order");

    group.bench_function("manual_supplier", |b| {
        let engine = engine();
        let business_id = configured(&engine);
        let buyer = BusinessRef::new(business_id, OutletId::new(), "Kopi Senja");
        let supplier = supplier(&engine, business_id);
        let actor = Actor::new(UserId::new(), "Budi", Role::Manager);
        let line = OrderLine::new(
            "ING-MILK",
            "Fresh Milk",
            "l",
            Decimal::new(10, 0),
            Decimal::new(18_000, 0),
            CATEGORY,
        );

        b.iter(|| {
            let draft = OrderDraft::new(supplier.clone(), vec![line.clone()]);
            black_box(engine.submit(&buyer, draft, &actor).unwrap());
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_commit_latency,
    bench_contended_commits,
    bench_submit_order
);
criterion_main!(benches);
