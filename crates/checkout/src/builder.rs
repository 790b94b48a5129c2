//! Order builder: validation and per-line reservation.

use common::{AddressId, IdempotencyKey, ItemId, OrderId, UserId};
use domain::{Address, InventoryItem, Order, OrderLineItem, OrderTotals, PayMethod, ShippingPolicy};
use store::{Catalog, StoreTransaction};
use tracing::instrument;

use crate::error::{CommitError, Result};
use crate::ledger::InventoryLedger;

/// One requested line: an item and how many units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineRequest {
    pub item_id: ItemId,
    pub quantity: u32,
}

impl LineRequest {
    pub fn new(item_id: ItemId, quantity: u32) -> Self {
        Self { item_id, quantity }
    }
}

/// A validated order, ready to be reserved and written.
#[derive(Debug, Clone)]
pub struct OrderDraft {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub pay_method: PayMethod,
    pub lines: Vec<LineRequest>,
    pub idempotency_key: Option<IdempotencyKey>,
}

/// The rows written by a successful build.
#[derive(Debug, Clone)]
pub struct BuiltOrder {
    pub order: Order,
    pub lines: Vec<OrderLineItem>,
}

/// Validates commit requests and turns them into order rows.
#[derive(Debug, Clone, Default)]
pub struct OrderBuilder {
    ledger: InventoryLedger,
    shipping: ShippingPolicy,
}

impl OrderBuilder {
    pub fn new(ledger: InventoryLedger, shipping: ShippingPolicy) -> Self {
        Self { ledger, shipping }
    }

    pub fn shipping(&self) -> &ShippingPolicy {
        &self.shipping
    }

    pub fn ledger(&self) -> &InventoryLedger {
        &self.ledger
    }

    /// Resolves the address and checks that it belongs to `user_id`.
    pub async fn validate_address<K>(
        &self,
        catalog: &K,
        user_id: UserId,
        address_id: AddressId,
    ) -> Result<Address>
    where
        K: Catalog + ?Sized,
    {
        catalog
            .get_address(address_id)
            .await?
            .filter(|address| address.belongs_to(user_id))
            .ok_or(CommitError::InvalidAddress(address_id))
    }

    /// Parses a submitted payment method code.
    ///
    /// Anything other than a recognized integer code, including text and
    /// out-of-range numbers, is rejected.
    pub fn validate_pay_method(&self, raw: &str) -> Result<PayMethod> {
        raw.trim()
            .parse::<i16>()
            .ok()
            .and_then(PayMethod::from_code)
            .ok_or_else(|| CommitError::InvalidPayMethod(raw.to_string()))
    }

    /// Resolves every item, failing on the first unknown id.
    pub async fn validate_items<K>(&self, catalog: &K, item_ids: &[ItemId]) -> Result<Vec<InventoryItem>>
    where
        K: Catalog + ?Sized,
    {
        let mut items = Vec::with_capacity(item_ids.len());
        for item_id in item_ids {
            let item = catalog
                .get_item(*item_id)
                .await?
                .ok_or(CommitError::ItemNotFound(*item_id))?;
            items.push(item);
        }
        Ok(items)
    }

    /// Reserves every line and writes the order header and its lines in `tx`.
    ///
    /// The first failing line aborts the build; the caller must then roll
    /// back `tx` so that reservations taken for earlier lines are undone.
    #[instrument(skip(self, tx, draft), fields(user_id = %draft.user_id, lines = draft.lines.len()))]
    pub async fn build<T>(&self, tx: &mut T, draft: &OrderDraft) -> Result<BuiltOrder>
    where
        T: StoreTransaction + ?Sized,
    {
        if draft.lines.is_empty() {
            return Err(CommitError::IncompleteData("no line items".to_string()));
        }

        let order_id = OrderId::generate();
        let mut totals = OrderTotals::default();
        let mut lines = Vec::with_capacity(draft.lines.len());

        for request in &draft.lines {
            if request.quantity == 0 {
                return Err(CommitError::IncompleteData(format!(
                    "zero quantity for item {}",
                    request.item_id
                )));
            }
            let reservation = self
                .ledger
                .reserve(tx, request.item_id, request.quantity)
                .await?;
            let line = OrderLineItem::new(
                order_id,
                request.item_id,
                request.quantity,
                reservation.unit_price,
            );
            totals.add_line(&line);
            lines.push(line);
        }

        let order = Order::unpaid(
            order_id,
            draft.user_id,
            draft.address_id,
            draft.pay_method,
            totals,
            self.shipping.fee_for(totals.price),
            draft.idempotency_key.clone(),
        );

        tx.insert_order(&order).await?;
        for line in &lines {
            tx.insert_line(line).await?;
        }

        Ok(BuiltOrder { order, lines })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Money;
    use store::{InMemoryStore, OrderStore};

    use crate::retry::RetryPolicy;

    fn store() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.upsert_item(InventoryItem::new(
            ItemId::new(1),
            "Strawberries",
            Money::from_minor(1000),
            5,
        ));
        store.upsert_item(InventoryItem::new(
            ItemId::new(2),
            "Grapes",
            Money::from_minor(2500),
            1,
        ));
        store.upsert_address(Address {
            id: AddressId::new(1),
            user_id: UserId::new(1),
            receiver: "Li Lei".to_string(),
            detail: "1 Market St".to_string(),
            phone: "13800000000".to_string(),
        });
        store
    }

    fn builder() -> OrderBuilder {
        OrderBuilder::new(
            InventoryLedger::new(RetryPolicy::immediate(3)),
            ShippingPolicy::default(),
        )
    }

    fn draft(lines: Vec<LineRequest>) -> OrderDraft {
        OrderDraft {
            user_id: UserId::new(1),
            address_id: AddressId::new(1),
            pay_method: PayMethod::GatewayPay,
            lines,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_address_must_belong_to_user() {
        let store = store();
        let builder = builder();

        assert!(
            builder
                .validate_address(&store, UserId::new(1), AddressId::new(1))
                .await
                .is_ok()
        );
        let err = builder
            .validate_address(&store, UserId::new(2), AddressId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::InvalidAddress(_)));
    }

    #[test]
    fn test_pay_method_validation() {
        let builder = builder();
        assert_eq!(builder.validate_pay_method("3").unwrap(), PayMethod::GatewayPay);
        assert_eq!(builder.validate_pay_method(" 1 ").unwrap(), PayMethod::CashOnDelivery);
        for raw in ["7", "70000", "alipay", "3.5", ""] {
            assert!(
                matches!(builder.validate_pay_method(raw), Err(CommitError::InvalidPayMethod(_))),
                "{raw:?} accepted"
            );
        }
    }

    #[tokio::test]
    async fn test_validate_items_reports_first_unknown() {
        let store = store();
        let err = builder()
            .validate_items(&store, &[ItemId::new(1), ItemId::new(9), ItemId::new(8)])
            .await
            .unwrap_err();
        assert!(matches!(err, CommitError::ItemNotFound(id) if id == ItemId::new(9)));
    }

    #[tokio::test]
    async fn test_build_accumulates_totals_and_shipping() {
        let store = store();
        let mut tx = store.begin().await.unwrap();

        let built = builder()
            .build(
                &mut tx,
                &draft(vec![
                    LineRequest::new(ItemId::new(1), 2),
                    LineRequest::new(ItemId::new(2), 1),
                ]),
            )
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(built.order.total_count, 3);
        assert_eq!(built.order.total_price, Money::from_minor(4500));
        assert_eq!(built.order.shipping_fee, Money::from_minor(1000));
        assert_eq!(built.lines.len(), 2);
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.line_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_line_leaves_earlier_reservation_to_rollback() {
        let store = store();
        let mut tx = store.begin().await.unwrap();

        let err = builder()
            .build(
                &mut tx,
                &draft(vec![
                    LineRequest::new(ItemId::new(1), 2),
                    LineRequest::new(ItemId::new(2), 3),
                ]),
            )
            .await
            .unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, CommitError::InsufficientStock { .. }));
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_draft_is_incomplete() {
        let store = store();
        let mut tx = store.begin().await.unwrap();
        let err = builder().build(&mut tx, &draft(Vec::new())).await.unwrap_err();
        assert!(matches!(err, CommitError::IncompleteData(_)));
    }
}
