//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration
//! ```

use std::sync::Arc;

use common::{AddressId, IdempotencyKey, ItemId, Money, OrderId, UserId};
use domain::{Address, InventoryItem, Order, OrderLineItem, OrderStatus, OrderTotals, PayMethod};
use serial_test::serial;
use sqlx::PgPool;
use store::{Catalog, OrderStore, PostgresStore, StoreError, StoreTransaction};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            PostgresStore::new(temp_pool.clone())
                .run_migrations()
                .await
                .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool, cleared tables and a seeded catalog
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;
    let store = PostgresStore::connect(&info.connection_string, 5)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_line_items, orders, addresses, inventory_items")
        .execute(store.pool())
        .await
        .unwrap();

    store
        .upsert_item(&InventoryItem::new(
            ItemId::new(1),
            "Strawberries",
            Money::from_minor(2500),
            2,
        ))
        .await
        .unwrap();
    store
        .upsert_address(&Address {
            id: AddressId::new(1),
            user_id: UserId::new(1),
            receiver: "Han Meimei".to_string(),
            detail: "8 Orchard Road".to_string(),
            phone: "13900000000".to_string(),
        })
        .await
        .unwrap();

    store
}

fn unpaid_order(key: Option<&str>) -> Order {
    Order::unpaid(
        OrderId::generate(),
        UserId::new(1),
        AddressId::new(1),
        PayMethod::GatewayPay,
        OrderTotals::default(),
        Money::from_minor(1000),
        key.and_then(IdempotencyKey::new),
    )
}

#[tokio::test]
#[serial]
async fn reads_seeded_catalog() {
    let store = get_test_store().await;

    let item = store.get_item(ItemId::new(1)).await.unwrap().unwrap();
    assert_eq!(item.stock, 2);
    assert_eq!(item.price, Money::from_minor(2500));

    let address = store.get_address(AddressId::new(1)).await.unwrap().unwrap();
    assert!(address.belongs_to(UserId::new(1)));

    assert!(store.get_item(ItemId::new(404)).await.unwrap().is_none());
}

#[tokio::test]
#[serial]
async fn compare_and_swap_rejects_stale_stock() {
    let store = get_test_store().await;

    let mut first = store.begin().await.unwrap();
    let observed = first.get_item(ItemId::new(1)).await.unwrap().unwrap();
    assert_eq!(first.compare_and_swap_stock(&observed, 1).await.unwrap(), 1);
    first.commit().await.unwrap();

    // The second writer read the same snapshot before the first committed.
    let mut second = store.begin().await.unwrap();
    assert_eq!(
        second.compare_and_swap_stock(&observed, 1).await.unwrap(),
        0
    );
    second.rollback().await.unwrap();

    let item = store.get_item(ItemId::new(1)).await.unwrap().unwrap();
    assert_eq!(item.stock, 1);
    assert_eq!(item.sales, 1);
}

#[tokio::test]
#[serial]
async fn rollback_discards_order_lines_and_stock() {
    let store = get_test_store().await;
    let order = unpaid_order(None);

    let mut tx = store.begin().await.unwrap();
    let observed = tx.get_item(ItemId::new(1)).await.unwrap().unwrap();
    tx.compare_and_swap_stock(&observed, 2).await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_line(&OrderLineItem::new(
        order.order_id,
        ItemId::new(1),
        2,
        Money::from_minor(2500),
    ))
    .await
    .unwrap();
    tx.rollback().await.unwrap();

    assert!(store.get_order(order.order_id).await.unwrap().is_none());
    assert!(
        store
            .get_order_lines(order.order_id)
            .await
            .unwrap()
            .is_empty()
    );
    let item = store.get_item(ItemId::new(1)).await.unwrap().unwrap();
    assert_eq!(item.stock, 2);
}

#[tokio::test]
#[serial]
async fn committed_order_roundtrips() {
    let store = get_test_store().await;
    let order = unpaid_order(Some("submit-1"));

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.insert_line(&OrderLineItem::new(
        order.order_id,
        ItemId::new(1),
        1,
        Money::from_minor(2500),
    ))
    .await
    .unwrap();
    tx.commit().await.unwrap();

    let stored = store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Unpaid);
    assert_eq!(stored.pay_method, PayMethod::GatewayPay);
    assert_eq!(stored.idempotency_key, order.idempotency_key);

    let lines = store.get_order_lines(order.order_id).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].unit_price, Money::from_minor(2500));

    let found = store
        .find_order_by_idempotency_key(UserId::new(1), &IdempotencyKey::new("submit-1").unwrap())
        .await
        .unwrap();
    assert_eq!(found, Some(order.order_id));
}

#[tokio::test]
#[serial]
async fn duplicate_idempotency_key_maps_to_store_error() {
    let store = get_test_store().await;

    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&unpaid_order(Some("dup"))).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let result = tx.insert_order(&unpaid_order(Some("dup"))).await;
    assert!(matches!(
        result,
        Err(StoreError::DuplicateIdempotencyKey(_))
    ));
}

#[tokio::test]
#[serial]
async fn status_transition_is_conditional() {
    let store = get_test_store().await;
    let order = unpaid_order(None);
    let mut tx = store.begin().await.unwrap();
    tx.insert_order(&order).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let first = tx
        .transition_status(
            order.order_id,
            OrderStatus::Unpaid,
            OrderStatus::AwaitingReview,
            Some("2017032121001004070200176844"),
        )
        .await
        .unwrap();
    let second = tx
        .transition_status(
            order.order_id,
            OrderStatus::Unpaid,
            OrderStatus::AwaitingReview,
            Some("other"),
        )
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!((first, second), (1, 0));
    let stored = store.get_order(order.order_id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::AwaitingReview);
    assert_eq!(
        stored.gateway_trade_no.as_deref(),
        Some("2017032121001004070200176844")
    );
}
