use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

use asrs_core::{ItemId, Money};
use asrs_events::NullEventBus;
use asrs_infra::{AllocationEngine, InMemoryWarehouseStore, ManualOperations, WarehouseStore};
use asrs_warehouse::{Customer, NewItem, OrderLineRequest, PlaceOrder, TopologySpec};

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
}

/// A rack with every compartment holding the same item.
fn full_rack(rt: &Runtime, topology: &TopologySpec) -> (InMemoryWarehouseStore, ItemId) {
    rt.block_on(async {
        let store = InMemoryWarehouseStore::new();
        store.provision(topology).await.unwrap();
        let item = store.create_item(NewItem::new("Gear", "")).await.unwrap();

        let ops = ManualOperations::new(store.clone(), NullEventBus);
        for row in store.compartment_rows().await.unwrap() {
            ops.stock(&row.location, item.id).await.unwrap();
        }
        (store, item.id)
    })
}

fn order(item: ItemId, quantity: u32) -> PlaceOrder {
    PlaceOrder::new(
        Customer::new("Bench", "bench@example.com"),
        vec![OrderLineRequest::new(item, quantity, Money::from_cents(100))],
    )
}

fn bench_place_order(c: &mut Criterion) {
    let rt = runtime();
    let topology = TopologySpec::default();
    let mut group = c.benchmark_group("place_order_default_rack");

    for quantity in [1u32, 10, 50] {
        group.throughput(Throughput::Elements(quantity as u64));
        group.bench_with_input(BenchmarkId::from_parameter(quantity), &quantity, |b, &quantity| {
            b.iter_batched(
                || full_rack(&rt, &topology),
                |(store, item)| {
                    let engine = AllocationEngine::new(store, NullEventBus);
                    let placed = rt.block_on(engine.place_order(order(item, quantity))).unwrap();
                    black_box(placed)
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_rejected_order(c: &mut Criterion) {
    let rt = runtime();
    let (store, item) = full_rack(&rt, &TopologySpec::default());
    let engine = AllocationEngine::new(store, NullEventBus);

    // Rejected orders roll back, so the rack can be reused across iterations.
    c.bench_function("place_order_insufficient_inventory", |b| {
        b.iter(|| {
            let err = rt.block_on(engine.place_order(order(item, 1_000))).unwrap_err();
            black_box(err)
        });
    });
}

criterion_group!(benches, bench_place_order, bench_rejected_order);
criterion_main!(benches);
