use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{AddressId, IdempotencyKey, ItemId, OrderId, UserId};
use domain::{Address, InventoryItem, Order, OrderLineItem, OrderStatus};

use crate::{
    Result, StoreError,
    store::{Catalog, OrderStore, StoreTransaction},
};

#[derive(Debug, Default)]
struct MemoryState {
    items: HashMap<ItemId, InventoryItem>,
    addresses: HashMap<AddressId, Address>,
    orders: HashMap<OrderId, Order>,
    lines: HashMap<OrderId, Vec<OrderLineItem>>,
    idempotency_keys: HashMap<(UserId, IdempotencyKey), OrderId>,
    forced_conflicts: HashMap<ItemId, u32>,
    fail_on_line_insert: bool,
}

impl MemoryState {
    fn key_owner(&self, order: &Order) -> Option<OrderId> {
        let key = order.idempotency_key.as_ref()?;
        self.idempotency_keys
            .get(&(order.user_id, key.clone()))
            .copied()
    }
}

fn lock(state: &Mutex<MemoryState>) -> MutexGuard<'_, MemoryState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store implementation for testing.
///
/// Stock mutations apply immediately, like a row update inside a database
/// transaction, and are undone on rollback. Order and line inserts stay
/// private to the transaction until commit.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a catalog item.
    pub fn upsert_item(&self, item: InventoryItem) {
        lock(&self.state).items.insert(item.id, item);
    }

    /// Inserts or replaces a shipping address.
    pub fn upsert_address(&self, address: Address) {
        lock(&self.state).addresses.insert(address.id, address);
    }

    /// Returns an item's committed counters.
    pub fn item(&self, item_id: ItemId) -> Option<InventoryItem> {
        lock(&self.state).items.get(&item_id).cloned()
    }

    /// Returns the number of committed orders.
    pub fn order_count(&self) -> usize {
        lock(&self.state).orders.len()
    }

    /// Returns the number of committed line items across all orders.
    pub fn line_count(&self) -> usize {
        lock(&self.state).lines.values().map(Vec::len).sum()
    }

    /// Makes the next `times` compare-and-swap attempts on `item_id` report
    /// zero affected rows, as if a concurrent writer had won each race.
    pub fn force_stock_conflicts(&self, item_id: ItemId, times: u32) {
        lock(&self.state).forced_conflicts.insert(item_id, times);
    }

    /// Configures line inserts to fail.
    pub fn set_fail_on_line_insert(&self, fail: bool) {
        lock(&self.state).fail_on_line_insert = fail;
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn get_item(&self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        Ok(self.item(item_id))
    }

    async fn get_address(&self, address_id: AddressId) -> Result<Option<Address>> {
        Ok(lock(&self.state).addresses.get(&address_id).cloned())
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx> {
        Ok(InMemoryTransaction::new(self.state.clone()))
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(lock(&self.state).orders.get(&order_id).cloned())
    }

    async fn get_order_lines(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        Ok(lock(&self.state)
            .lines
            .get(&order_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let state = lock(&self.state);
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.order_id.cmp(&a.order_id));
        Ok(orders)
    }

    async fn find_order_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &IdempotencyKey,
    ) -> Result<Option<OrderId>> {
        Ok(lock(&self.state)
            .idempotency_keys
            .get(&(user_id, key.clone()))
            .copied())
    }
}

#[derive(Debug)]
enum Undo {
    Reserved {
        item_id: ItemId,
        quantity: u32,
    },
    Released {
        item_id: ItemId,
        quantity: u32,
    },
    Status {
        order_id: OrderId,
        previous: OrderStatus,
        previous_trade_no: Option<String>,
    },
    Comment {
        order_id: OrderId,
        item_id: ItemId,
        previous: Option<String>,
    },
}

/// Transaction over an [`InMemoryStore`].
pub struct InMemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    undo: Vec<Undo>,
    pending_orders: Vec<Order>,
    pending_lines: Vec<OrderLineItem>,
    finished: bool,
}

impl InMemoryTransaction {
    fn new(state: Arc<Mutex<MemoryState>>) -> Self {
        Self {
            state,
            undo: Vec::new(),
            pending_orders: Vec::new(),
            pending_lines: Vec::new(),
            finished: false,
        }
    }

    fn apply_cas(&mut self, observed: &InventoryItem, quantity: u32) -> u64 {
        let mut state = lock(&self.state);

        if let Some(remaining) = state.forced_conflicts.get_mut(&observed.id)
            && *remaining > 0
        {
            *remaining -= 1;
            return 0;
        }

        let Some(item) = state.items.get_mut(&observed.id) else {
            return 0;
        };
        if item.stock != observed.stock {
            return 0;
        }
        let Some(new_stock) = item.stock.checked_sub(quantity) else {
            return 0;
        };

        item.stock = new_stock;
        item.sales += quantity;
        self.undo.push(Undo::Reserved {
            item_id: observed.id,
            quantity,
        });
        1
    }

    fn apply_release(&mut self, item_id: ItemId, quantity: u32) {
        let mut state = lock(&self.state);
        if let Some(item) = state.items.get_mut(&item_id) {
            item.stock += quantity;
            self.undo.push(Undo::Released { item_id, quantity });
        }
    }

    fn stage_order(&mut self, order: &Order) -> Result<()> {
        let state = lock(&self.state);
        if let Some(key) = &order.idempotency_key {
            let taken_in_tx = self
                .pending_orders
                .iter()
                .any(|o| o.user_id == order.user_id && o.idempotency_key.as_ref() == Some(key));
            if taken_in_tx || state.key_owner(order).is_some() {
                return Err(StoreError::DuplicateIdempotencyKey(key.clone()));
            }
        }
        drop(state);
        self.pending_orders.push(order.clone());
        Ok(())
    }

    fn stage_line(&mut self, line: &OrderLineItem) -> Result<()> {
        if lock(&self.state).fail_on_line_insert {
            return Err(StoreError::Unavailable(format!(
                "line insert rejected for order {}",
                line.order_id
            )));
        }
        self.pending_lines.push(line.clone());
        Ok(())
    }

    fn apply_transition(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> u64 {
        if let Some(order) = self
            .pending_orders
            .iter_mut()
            .find(|o| o.order_id == order_id)
        {
            if order.status != from {
                return 0;
            }
            order.status = to;
            if let Some(trade_no) = trade_no {
                order.gateway_trade_no = Some(trade_no.to_string());
            }
            return 1;
        }

        let mut state = lock(&self.state);
        let Some(order) = state.orders.get_mut(&order_id) else {
            return 0;
        };
        if order.status != from {
            return 0;
        }
        self.undo.push(Undo::Status {
            order_id,
            previous: order.status,
            previous_trade_no: order.gateway_trade_no.clone(),
        });
        order.status = to;
        if let Some(trade_no) = trade_no {
            order.gateway_trade_no = Some(trade_no.to_string());
        }
        1
    }

    fn apply_comment(&mut self, order_id: OrderId, item_id: ItemId, comment: &str) -> u64 {
        let mut state = lock(&self.state);
        let Some(line) = state
            .lines
            .get_mut(&order_id)
            .and_then(|lines| lines.iter_mut().find(|l| l.item_id == item_id))
        else {
            return 0;
        };
        self.undo.push(Undo::Comment {
            order_id,
            item_id,
            previous: line.comment.replace(comment.to_string()),
        });
        1
    }

    fn revert(&mut self, state: &mut MemoryState) {
        while let Some(entry) = self.undo.pop() {
            match entry {
                Undo::Reserved { item_id, quantity } => {
                    if let Some(item) = state.items.get_mut(&item_id) {
                        item.stock += quantity;
                        item.sales = item.sales.saturating_sub(quantity);
                    }
                }
                Undo::Released { item_id, quantity } => {
                    if let Some(item) = state.items.get_mut(&item_id) {
                        item.stock = item.stock.saturating_sub(quantity);
                    }
                }
                Undo::Status {
                    order_id,
                    previous,
                    previous_trade_no,
                } => {
                    if let Some(order) = state.orders.get_mut(&order_id) {
                        order.status = previous;
                        order.gateway_trade_no = previous_trade_no;
                    }
                }
                Undo::Comment {
                    order_id,
                    item_id,
                    previous,
                } => {
                    if let Some(line) = state
                        .lines
                        .get_mut(&order_id)
                        .and_then(|lines| lines.iter_mut().find(|l| l.item_id == item_id))
                    {
                        line.comment = previous;
                    }
                }
            }
        }
        self.pending_orders.clear();
        self.pending_lines.clear();
    }

    fn finish_commit(&mut self) -> Result<()> {
        let state_arc = self.state.clone();
        let mut state = lock(&state_arc);
        self.finished = true;

        // Another transaction may have committed the same key since staging.
        if let Some(key) = self
            .pending_orders
            .iter()
            .find(|o| state.key_owner(o).is_some())
            .and_then(|o| o.idempotency_key.clone())
        {
            self.revert(&mut state);
            return Err(StoreError::DuplicateIdempotencyKey(key));
        }

        for order in self.pending_orders.drain(..) {
            if let Some(key) = &order.idempotency_key {
                state
                    .idempotency_keys
                    .insert((order.user_id, key.clone()), order.order_id);
            }
            state.lines.entry(order.order_id).or_default();
            state.orders.insert(order.order_id, order);
        }
        for line in self.pending_lines.drain(..) {
            state.lines.entry(line.order_id).or_default().push(line);
        }
        self.undo.clear();
        Ok(())
    }

    fn finish_rollback(&mut self) {
        let state_arc = self.state.clone();
        let mut state = lock(&state_arc);
        self.revert(&mut state);
        self.finished = true;
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.finish_rollback();
        }
    }
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn get_item(&mut self, item_id: ItemId) -> Result<Option<InventoryItem>> {
        Ok(lock(&self.state).items.get(&item_id).cloned())
    }

    async fn compare_and_swap_stock(
        &mut self,
        observed: &InventoryItem,
        quantity: u32,
    ) -> Result<u64> {
        Ok(self.apply_cas(observed, quantity))
    }

    async fn release_stock(&mut self, item_id: ItemId, quantity: u32) -> Result<()> {
        self.apply_release(item_id, quantity);
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.stage_order(order)
    }

    async fn insert_line(&mut self, line: &OrderLineItem) -> Result<()> {
        self.stage_line(line)
    }

    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        trade_no: Option<&str>,
    ) -> Result<u64> {
        Ok(self.apply_transition(order_id, from, to, trade_no))
    }

    async fn set_line_comment(
        &mut self,
        order_id: OrderId,
        item_id: ItemId,
        comment: &str,
    ) -> Result<u64> {
        Ok(self.apply_comment(order_id, item_id, comment))
    }

    async fn commit(mut self) -> Result<()> {
        self.finish_commit()
    }

    async fn rollback(mut self) -> Result<()> {
        self.finish_rollback();
        Ok(())
    }
}
