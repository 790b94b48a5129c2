use std::sync::Arc;

use cart::{CartStore, InMemoryCartStore};
use checkout::{CommitOrchestrator, InventoryLedger, OrderBuilder, RetryPolicy};
use common::{AddressId, ItemId, Money, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{Address, CommitRequest, InventoryItem, ShippingPolicy};
use store::InMemoryStore;

const BUYERS: i64 = 32;

fn setup(stock: u32) -> (Arc<CommitOrchestrator<InMemoryStore, InMemoryCartStore>>, InMemoryCartStore) {
    let store = InMemoryStore::new();
    store.upsert_item(InventoryItem::new(
        ItemId::new(1),
        "Hot item",
        Money::from_minor(1000),
        stock,
    ));
    for user in 1..=BUYERS {
        store.upsert_address(Address {
            id: AddressId::new(user),
            user_id: UserId::new(user),
            receiver: format!("Buyer {user}"),
            detail: "1 Market St".to_string(),
            phone: "13800000000".to_string(),
        });
    }
    let carts = InMemoryCartStore::new();
    let builder = OrderBuilder::new(
        InventoryLedger::new(RetryPolicy::default().with_max_attempts(8)),
        ShippingPolicy::default(),
    );
    (
        Arc::new(CommitOrchestrator::new(store, carts.clone(), builder)),
        carts,
    )
}

async fn fill_carts(carts: &InMemoryCartStore) {
    for user in 1..=BUYERS {
        carts
            .set(UserId::new(user), ItemId::new(1), 1)
            .await
            .unwrap();
    }
}

fn request(user: i64) -> CommitRequest {
    CommitRequest::new(UserId::new(user), AddressId::new(user), 3, [ItemId::new(1)])
}

fn bench_single_commit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("checkout/single_commit", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (orchestrator, carts) = setup(1);
                fill_carts(&carts).await;
                orchestrator.commit(request(1)).await.unwrap();
            });
        });
    });
}

fn bench_contended_commits(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("checkout/contended_commits_32_buyers_8_units", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (orchestrator, carts) = setup(8);
                fill_carts(&carts).await;
                let handles: Vec<_> = (1..=BUYERS)
                    .map(|user| {
                        let orchestrator = orchestrator.clone();
                        tokio::spawn(async move { orchestrator.commit(request(user)).await })
                    })
                    .collect();
                for handle in handles {
                    let _ = handle.await.unwrap();
                }
            });
        });
    });
}

criterion_group!(benches, bench_single_commit, bench_contended_commits);
criterion_main!(benches);
