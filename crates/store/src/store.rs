use async_trait::async_trait;
use common::{AddressId, IdempotencyKey, ItemId, OrderId, UserId};
use domain::{Address, InventoryItem, Order, OrderLineItem, OrderStatus};

use crate::Result;

/// Read-only view of the catalog owned by the storefront.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the current price/stock snapshot of an item.
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>>;

    /// Returns a shipping address by id.
    async fn get_address(&self, address_id: AddressId) -> Result<Option<Address>>;
}

/// Durable store for orders and their line items.
///
/// All writes go through a [`StoreTransaction`] so that order header,
/// line items and stock mutations commit or roll back together.
#[async_trait]
pub trait OrderStore: Catalog {
    type Tx: StoreTransaction + 'static;

    /// Opens a new transaction.
    async fn begin(&self) -> Result<Self::Tx>;

    /// Loads a committed order header.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the line items of a committed order, in insertion order.
    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>>;

    /// Lists a user's orders, newest first.
    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Finds the order committed under `(user_id, key)`, if any.
    async fn find_order_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>>;
}

/// A unit of work against the store.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls it
/// back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Reads the item's current counters as seen by this transaction.
    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>>;

    /// Takes `quantity` units from `observed.id` only if its stock still equals
    /// `observed.stock`. Returns the number of rows affected; zero means a
    /// concurrent writer changed the row since it was read.
    async fn compare_and_swap_stock(
        &mut self,
        observed: &InventoryItem,
        quantity: u32,
    ) -> Result<u64>;

    /// Returns `quantity` units to an item's stock. Sales are left untouched.
    async fn release_stock(&mut self, item_id: ItemId, quantity: u32) -> Result<()>;

    /// Inserts an order header.
    ///
    /// Fails with `DuplicateIdempotencyKey` if the order's key is taken.
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Inserts one line item of an order inserted in this transaction.
    async fn insert_line(&mut self, line: &OrderLineItem) -> Result<()>;

    /// Moves an order from `from` to `to` only if it is currently in `from`,
    /// recording `trade_no` when given. Returns the number of rows affected.
    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<u64>;

    /// Sets the review comment of one line. Returns the number of rows affected.
    async fn set_line_comment(
        &mut self,
        order_id: OrderId,
        item_id: ItemId,
        comment: &str,
    ) -> Result<u64>;

    /// Makes every write of this transaction durable.
    async fn commit(self) -> Result<()>;

    /// Discards every write of this transaction.
    async fn rollback(self) -> Result<()>;
}
