use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{Duration, Utc};
use retailops_approval::EntityKind;
use retailops_core::{EntityId, ItemId, LocationId, TenantId, UserId};
use retailops_infra::approvals::{ApprovalEngine, SubmitApproval};
use retailops_infra::catalog::InMemoryCatalog;
use retailops_infra::hooks::NoopHooks;
use retailops_infra::processor::MovementProcessor;
use retailops_infra::store::InMemoryStore;
use retailops_inventory::{AdjustQuantity, Adjustment, TransferLine, TransferStock};
use std::sync::Arc;

type Processor = MovementProcessor<Arc<InMemoryStore>, Arc<InMemoryCatalog>, NoopHooks>;

struct Setup {
    processor: Processor,
    catalog: Arc<InMemoryCatalog>,
    tenant_id: TenantId,
    from: LocationId,
    to: LocationId,
    items: Vec<ItemId>,
    actor: UserId,
}

fn setup(item_count: usize, opening: i64) -> Setup {
    let store = Arc::new(InMemoryStore::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let tenant_id = TenantId::new();
    let (from, to) = (LocationId::new(), LocationId::new());
    catalog.add_location(tenant_id, from);
    catalog.add_location(tenant_id, to);
    let items: Vec<ItemId> = (0..item_count).map(|_| ItemId::new()).collect();
    for item in &items {
        catalog.add_item(tenant_id, *item);
    }

    let processor = MovementProcessor::new(store, catalog.clone(), NoopHooks);
    let actor = UserId::new();
    for item in &items {
        processor
            .adjust_quantity(&adjust(tenant_id, from, *item, actor, Adjustment::Add(opening)))
            .unwrap();
    }

    Setup {
        processor,
        catalog,
        tenant_id,
        from,
        to,
        items,
        actor,
    }
}

fn adjust(tenant_id: TenantId, location_id: LocationId, item_id: ItemId, actor_id: UserId, adjustment: Adjustment) -> AdjustQuantity {
    AdjustQuantity {
        tenant_id,
        location_id,
        item_id,
        adjustment,
        reason: "benchmark".to_string(),
        notes: None,
        actor_id,
        occurred_at: Utc::now(),
    }
}

fn bench_adjust_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjust_latency");
    group.sample_size(1000);

    group.bench_function("adjust_existing_entry", |b| {
        let s = setup(1, 0);
        let item = s.items[0];
        b.iter(|| {
            s.processor
                .adjust_quantity(&adjust(s.tenant_id, s.from, item, s.actor, Adjustment::Add(black_box(5))))
                .unwrap();
        });
    });

    group.bench_function("adjust_new_entry", |b| {
        let s = setup(0, 0);
        b.iter(|| {
            let item = ItemId::new();
            s.catalog.add_item(s.tenant_id, item);
            s.processor
                .adjust_quantity(&adjust(s.tenant_id, s.from, item, s.actor, Adjustment::Add(1)))
                .unwrap();
        });
    });

    group.finish();
}

fn bench_transfer_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("transfer_throughput");

    for line_count in [1usize, 10, 50].iter() {
        group.throughput(Throughput::Elements(*line_count as u64));
        group.bench_with_input(
            BenchmarkId::new("lines_per_transfer", line_count),
            line_count,
            |b, &lines| {
                let s = setup(lines, i64::MAX / 4);
                let cmd = TransferStock {
                    tenant_id: s.tenant_id,
                    from_location: s.from,
                    to_location: s.to,
                    lines: s
                        .items
                        .iter()
                        .map(|item| TransferLine {
                            item_id: *item,
                            quantity: 1,
                        })
                        .collect(),
                    notes: None,
                    actor_id: s.actor,
                    occurred_at: Utc::now(),
                };
                b.iter(|| black_box(s.processor.transfer_stock(&cmd).unwrap()));
            },
        );
    }

    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let mut group = c.benchmark_group("deadline_sweep");

    for overdue in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*overdue as u64));
        group.bench_with_input(BenchmarkId::new("expire_overdue", overdue), overdue, |b, &n| {
            b.iter_batched(
                || {
                    let engine = ApprovalEngine::new(Arc::new(InMemoryStore::new()), NoopHooks);
                    let tenant_id = TenantId::new();
                    let submitted_at = Utc::now() - Duration::hours(1);
                    for _ in 0..n {
                        engine
                            .submit(&SubmitApproval {
                                tenant_id,
                                kind: EntityKind::CashCollection,
                                entity_id: EntityId::new(),
                                submitted_by: UserId::new(),
                                deadline_window: None,
                                occurred_at: submitted_at,
                            })
                            .unwrap();
                    }
                    engine
                },
                |engine| black_box(engine.sweep(Utc::now(), None, n).unwrap()),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_adjust_latency, bench_transfer_throughput, bench_sweep);
criterion_main!(benches);
