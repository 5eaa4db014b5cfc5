use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use std::sync::Arc;
use std::thread;

use stockledger_core::{ExpectedVersion, Money, ProductId, Quantity};
use stockledger_infra::store::{InMemoryLedgerStore, LedgerStore, WriteSet};
use stockledger_infra::{AdjustmentExecutor, ProductLocks};
use stockledger_inventory::{AdjustmentRequest, NewProduct, Product};

type Executor = AdjustmentExecutor<Arc<InMemoryLedgerStore>>;

fn executor() -> Executor {
    AdjustmentExecutor::new(Arc::new(InMemoryLedgerStore::new()), Arc::new(ProductLocks::new()))
}

fn seed(executor: &Executor, stock: u32) -> ProductId {
    let product = Product::create(
        ProductId::new(),
        NewProduct {
            name: "Chocolatina de borojó".to_string(),
            category: "Snack".to_string(),
            unit_price: Money::new(4000),
            tags: vec![],
        },
    )
    .unwrap();
    let id = product.id_typed();
    executor
        .store()
        .commit(WriteSet::new().put_product(product, ExpectedVersion::Exact(0)))
        .unwrap();
    executor
        .execute(AdjustmentRequest::Restock {
            product_id: id,
            quantity: Quantity::new(stock).unwrap(),
            batch_ref: None,
        })
        .unwrap();
    id
}

fn sale(product_id: ProductId) -> AdjustmentRequest {
    AdjustmentRequest::Sale {
        product_id,
        quantity: Quantity::new(1).unwrap(),
        total: None,
        customer_id: None,
    }
}

/// Single-threaded latency of each adjustment kind.
fn bench_adjustment_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("adjustment_latency");
    group.sample_size(1000);

    group.bench_function("sale", |b| {
        let executor = executor();
        let id = seed(&executor, u32::MAX);
        b.iter(|| black_box(executor.execute(sale(id)).unwrap()));
    });

    group.bench_function("restock", |b| {
        let executor = executor();
        let id = seed(&executor, 1);
        b.iter(|| {
            black_box(
                executor
                    .execute(AdjustmentRequest::Restock {
                        product_id: id,
                        quantity: Quantity::new(1).unwrap(),
                        batch_ref: None,
                    })
                    .unwrap(),
            )
        });
    });

    group.bench_function("sale_then_return", |b| {
        let executor = executor();
        let id = seed(&executor, 1);
        b.iter(|| {
            let sold = executor.execute(sale(id)).unwrap();
            black_box(
                executor
                    .execute(AdjustmentRequest::Return {
                        sale_entry_id: sold.entry.id_typed(),
                    })
                    .unwrap(),
            )
        });
    });

    group.finish();
}

/// Concurrent sales, all on one product (contended) or one product per thread.
fn bench_concurrent_sales(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_sales");
    const SALES_PER_THREAD: usize = 100;

    for threads in [2usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * SALES_PER_THREAD) as u64));

        group.bench_with_input(BenchmarkId::new("same_product", threads), &threads, |b, &threads| {
            let executor = Arc::new(executor());
            let id = seed(&executor, u32::MAX);
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let executor = executor.clone();
                        thread::spawn(move || {
                            for _ in 0..SALES_PER_THREAD {
                                executor.execute(sale(id)).unwrap();
                            }
                        })
                    })
                    .collect();
                handles.into_iter().for_each(|h| h.join().unwrap());
            });
        });

        let distinct = BenchmarkId::new("distinct_products", threads);
        group.bench_with_input(distinct, &threads, |b, &threads| {
            let executor = Arc::new(executor());
            let ids: Vec<_> = (0..threads).map(|_| seed(&executor, u32::MAX)).collect();
            b.iter(|| {
                let handles: Vec<_> = ids
                    .iter()
                    .map(|&id| {
                        let executor = executor.clone();
                        thread::spawn(move || {
                            for _ in 0..SALES_PER_THREAD {
                                executor.execute(sale(id)).unwrap();
                            }
                        })
                    })
                    .collect();
                handles.into_iter().for_each(|h| h.join().unwrap());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_adjustment_latency, bench_concurrent_sales);
criterion_main!(benches);
