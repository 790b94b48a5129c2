//! Order commit orchestrator.

use std::time::Instant;

use cart::CartStore;
use common::{ItemId, UserId};
use domain::CommitRequest;
use store::{OrderStore, StoreError, StoreTransaction};
use tracing::{debug, error, info, instrument, warn};

use crate::builder::{BuiltOrder, LineRequest, OrderBuilder, OrderDraft};
use crate::error::{CommitError, Result, ResultCode};
use crate::views::CheckoutPreview;

/// Turns selected cart entries into a durable order.
///
/// Validation runs before any write. Reservation, header and line inserts
/// share one store transaction; any failure rolls the whole commit back.
/// Cart entries are removed only after the transaction committed.
pub struct CommitOrchestrator<S, C> {
    store: S,
    carts: C,
    builder: OrderBuilder,
}

impl<S, C> CommitOrchestrator<S, C>
where
    S: OrderStore,
    C: CartStore,
{
    pub fn new(store: S, carts: C, builder: OrderBuilder) -> Self {
        Self {
            store,
            carts,
            builder,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn carts(&self) -> &C {
        &self.carts
    }

    /// Commits an order for the request's selected cart items.
    #[instrument(skip(self, request), fields(user_id = ?request.user_id))]
    pub async fn commit(&self, request: CommitRequest) -> Result<BuiltOrder> {
        let started = Instant::now();
        let result = self.try_commit(request).await;

        let code = match &result {
            Ok(_) => ResultCode::Success,
            Err(err) => err.code(),
        };
        record_commit(code, started);

        result
    }

    /// Rejects a commit whose request could not be decoded.
    ///
    /// The caller is still checked first, so an anonymous request reports
    /// `NOT_AUTHENTICATED` whatever its body holds.
    pub fn reject_malformed(&self, user_id: Option<UserId>, reason: impl Into<String>) -> CommitError {
        let err = match user_id {
            None => CommitError::NotAuthenticated,
            Some(_) => CommitError::IncompleteData(reason.into()),
        };
        debug!(?user_id, error = %err, "malformed commit request rejected");
        record_commit(err.code(), Instant::now());
        err
    }

    async fn try_commit(&self, request: CommitRequest) -> Result<BuiltOrder> {
        let user_id = request.user_id.ok_or(CommitError::NotAuthenticated)?;
        let address_id = request
            .address_id
            .ok_or_else(|| CommitError::IncompleteData("missing address_id".to_string()))?;
        let pay_code = request
            .pay_method
            .clone()
            .ok_or_else(|| CommitError::IncompleteData("missing pay_method".to_string()))?;
        let item_ids = request.distinct_item_ids();
        if item_ids.is_empty() {
            return Err(CommitError::IncompleteData("no items selected".to_string()));
        }

        if let Some(key) = &request.idempotency_key
            && let Some(existing) = self
                .store
                .find_order_by_idempotency_key(user_id, key)
                .await?
        {
            info!(%user_id, order_id = %existing, "duplicate submission rejected");
            return Err(CommitError::DuplicateSubmission(existing));
        }

        self.builder
            .validate_address(&self.store, user_id, address_id)
            .await?;
        let pay_method = self.builder.validate_pay_method(&pay_code)?;
        self.builder.validate_items(&self.store, &item_ids).await?;
        let lines = self.cart_lines(user_id, &item_ids).await?;

        let draft = OrderDraft {
            user_id,
            address_id,
            pay_method,
            lines,
            idempotency_key: request.idempotency_key,
        };
        let built = self.write(&draft).await?;

        self.clear_cart(user_id, &item_ids).await;

        info!(
            order_id = %built.order.order_id,
            %user_id,
            total_count = built.order.total_count,
            payable = %built.order.payable_total(),
            "order committed"
        );
        Ok(built)
    }

    /// Prices the selected cart items without reserving anything.
    #[instrument(skip(self, item_ids))]
    pub async fn preview(
        &self,
        user_id: Option<UserId>,
        item_ids: &[ItemId],
    ) -> Result<CheckoutPreview> {
        let user_id = user_id.ok_or(CommitError::NotAuthenticated)?;
        let request = CommitRequest {
            item_ids: item_ids.to_vec(),
            ..CommitRequest::default()
        };
        let item_ids = request.distinct_item_ids();
        if item_ids.is_empty() {
            return Err(CommitError::IncompleteData("no items selected".to_string()));
        }

        let items = self.builder.validate_items(&self.store, &item_ids).await?;
        let lines = self.cart_lines(user_id, &item_ids).await?;

        let mut preview = CheckoutPreview::default();
        for (item, line) in items.into_iter().zip(lines) {
            preview.push(item, line.quantity);
        }
        preview.shipping_fee = self.builder.shipping().fee_for(preview.total_price);
        preview.payable = self.builder.shipping().payable(preview.total_price);
        Ok(preview)
    }

    async fn cart_lines(&self, user_id: UserId, item_ids: &[ItemId]) -> Result<Vec<LineRequest>> {
        let cart = self.carts.list_all(user_id).await?;
        item_ids
            .iter()
            .map(|item_id| {
                cart.get(item_id)
                    .map(|quantity| LineRequest::new(*item_id, *quantity))
                    .ok_or_else(|| {
                        CommitError::IncompleteData(format!("item {item_id} is not in the cart"))
                    })
            })
            .collect()
    }

    async fn write(&self, draft: &OrderDraft) -> Result<BuiltOrder> {
        let mut tx = self.store.begin().await?;

        let built = match self.builder.build(&mut tx, draft).await {
            Ok(built) => built,
            Err(err) => {
                warn!(user_id = %draft.user_id, error = %err, "commit aborted, rolling back");
                if let Err(rollback_err) = tx.rollback().await {
                    error!(error = %rollback_err, "rollback failed");
                }
                return Err(self.resolve_duplicate(draft, err).await);
            }
        };

        if let Err(err) = tx.commit().await {
            warn!(user_id = %draft.user_id, error = %err, "commit rejected by store");
            return Err(self.resolve_duplicate(draft, err.into()).await);
        }

        Ok(built)
    }

    /// Maps a lost idempotency-key race onto the order that won it.
    async fn resolve_duplicate(&self, draft: &OrderDraft, err: CommitError) -> CommitError {
        if let CommitError::Store(StoreError::DuplicateIdempotencyKey(key)) = &err
            && let Ok(Some(existing)) = self
                .store
                .find_order_by_idempotency_key(draft.user_id, key)
                .await
        {
            return CommitError::DuplicateSubmission(existing);
        }
        err
    }

    async fn clear_cart(&self, user_id: UserId, item_ids: &[ItemId]) {
        if let Err(err) = self.carts.delete(user_id, item_ids).await {
            metrics::counter!("checkout_cart_cleanup_failures_total").increment(1);
            warn!(%user_id, error = %err, "order committed but cart cleanup failed");
        }
    }
}

fn record_commit(code: ResultCode, started: Instant) {
    metrics::counter!("checkout_commits_total", "code" => code.as_str()).increment(1);
    metrics::histogram!("checkout_commit_duration_seconds").record(started.elapsed().as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use cart::InMemoryCartStore;
    use common::{AddressId, IdempotencyKey, Money};
    use domain::{Address, InventoryItem, OrderStatus, ShippingPolicy};
    use store::InMemoryStore;

    use crate::ledger::InventoryLedger;
    use crate::retry::RetryPolicy;

    const USER: i64 = 1;

    fn setup() -> (
        CommitOrchestrator<InMemoryStore, InMemoryCartStore>,
        InMemoryStore,
        InMemoryCartStore,
    ) {
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
            2,
        ));
        store.upsert_address(Address {
            id: AddressId::new(1),
            user_id: UserId::new(USER),
            receiver: "Li Lei".to_string(),
            detail: "1 Market St".to_string(),
            phone: "13800000000".to_string(),
        });
        store.upsert_address(Address {
            id: AddressId::new(2),
            user_id: UserId::new(2),
            receiver: "Han Meimei".to_string(),
            detail: "8 Orchard Road".to_string(),
            phone: "13900000000".to_string(),
        });

        let carts = InMemoryCartStore::new();
        let builder = OrderBuilder::new(
            InventoryLedger::new(RetryPolicy::immediate(3)),
            ShippingPolicy::default(),
        );
        let orchestrator = CommitOrchestrator::new(store.clone(), carts.clone(), builder);
        (orchestrator, store, carts)
    }

    async fn fill_cart(carts: &InMemoryCartStore, entries: &[(i64, u32)]) {
        for (item, quantity) in entries {
            carts
                .set(UserId::new(USER), ItemId::new(*item), *quantity)
                .await
                .unwrap();
        }
    }

    fn request(items: &[i64]) -> CommitRequest {
        CommitRequest::new(
            UserId::new(USER),
            AddressId::new(1),
            3,
            items.iter().copied().map(ItemId::new),
        )
    }

    #[tokio::test]
    async fn test_commit_success_clears_selected_cart_entries() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 2), (2, 1)]).await;

        let built = orchestrator.commit(request(&[1])).await.unwrap();

        assert_eq!(built.order.status, OrderStatus::Unpaid);
        assert_eq!(built.order.total_price, Money::from_minor(2000));
        assert_eq!(built.order.payable_total(), Money::from_minor(3000));
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 3);

        let remaining = carts.list_all(UserId::new(USER)).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining.contains_key(&ItemId::new(2)));
    }

    #[tokio::test]
    async fn test_validation_order() {
        let (orchestrator, _, carts) = setup();
        fill_cart(&carts, &[(1, 1)]).await;

        let err = orchestrator
            .commit(CommitRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ResultCode::NotAuthenticated);

        let mut incomplete = request(&[1]);
        incomplete.address_id = None;
        let err = orchestrator.commit(incomplete).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::IncompleteData);

        let mut foreign_address = request(&[1]);
        foreign_address.address_id = Some(AddressId::new(2));
        foreign_address.pay_method = Some("9".to_string());
        let err = orchestrator.commit(foreign_address).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidAddress);

        let mut bad_method = request(&[1]);
        bad_method.pay_method = Some("9".to_string());
        let err = orchestrator.commit(bad_method).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::InvalidPayMethod);

        let err = orchestrator.commit(request(&[1, 404])).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::ItemNotFound);

        let err = orchestrator.commit(request(&[2])).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::IncompleteData);
    }

    #[test]
    fn test_reject_malformed_checks_caller_first() {
        let (orchestrator, store, _) = setup();

        let err = orchestrator.reject_malformed(None, "body is not JSON");
        assert_eq!(err.code(), ResultCode::NotAuthenticated);

        let err = orchestrator.reject_malformed(Some(UserId::new(USER)), "body is not JSON");
        assert_eq!(err.code(), ResultCode::IncompleteData);
        assert!(err.to_string().contains("body is not JSON"));
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_insufficient_stock_keeps_cart_and_stock() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 2), (2, 3)]).await;

        let err = orchestrator.commit(request(&[1, 2])).await.unwrap_err();

        assert_eq!(err.code(), ResultCode::InsufficientStock);
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);
        assert_eq!(store.order_count(), 0);
        assert_eq!(carts.count(UserId::new(USER)).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_report_commit_failed() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 1), (2, 1)]).await;
        store.force_stock_conflicts(ItemId::new(2), 3);

        let err = orchestrator.commit(request(&[1, 2])).await.unwrap_err();

        assert!(matches!(err, CommitError::ReservationFailed { attempts: 3, .. }));
        assert_eq!(err.code(), ResultCode::CommitFailed);
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);
        assert_eq!(store.order_count(), 0);
    }

    #[tokio::test]
    async fn test_line_insert_fault_rolls_back_everything() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 1)]).await;
        store.set_fail_on_line_insert(true);

        let err = orchestrator.commit(request(&[1])).await.unwrap_err();

        assert_eq!(err.code(), ResultCode::CommitFailed);
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);
        assert_eq!(store.order_count(), 0);
        assert_eq!(store.line_count(), 0);
        assert_eq!(carts.count(UserId::new(USER)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_rejected_without_mutation() {
        let (orchestrator, store, carts) = setup();
        let key = IdempotencyKey::new("checkout-1").unwrap();
        fill_cart(&carts, &[(1, 1)]).await;

        let first = orchestrator
            .commit(request(&[1]).with_idempotency_key(key.clone()))
            .await
            .unwrap();

        fill_cart(&carts, &[(1, 1)]).await;
        let err = orchestrator
            .commit(request(&[1]).with_idempotency_key(key))
            .await
            .unwrap_err();

        assert!(matches!(err, CommitError::DuplicateSubmission(id) if id == first.order.order_id));
        assert_eq!(store.order_count(), 1);
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 4);
    }

    #[tokio::test]
    async fn test_cart_cleanup_failure_still_commits() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 1)]).await;
        carts.set_fail_on_delete(true);

        let built = orchestrator.commit(request(&[1])).await.unwrap();

        assert_eq!(store.order_count(), 1);
        assert_eq!(built.lines.len(), 1);
        assert_eq!(carts.count(UserId::new(USER)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_item_ids_collapse_into_one_line() {
        let (orchestrator, _, carts) = setup();
        fill_cart(&carts, &[(1, 2)]).await;

        let built = orchestrator.commit(request(&[1, 1])).await.unwrap();

        assert_eq!(built.lines.len(), 1);
        assert_eq!(built.order.total_count, 2);
    }

    #[tokio::test]
    async fn test_preview_does_not_reserve() {
        let (orchestrator, store, carts) = setup();
        fill_cart(&carts, &[(1, 2), (2, 1)]).await;

        let preview = orchestrator
            .preview(Some(UserId::new(USER)), &[ItemId::new(1), ItemId::new(2)])
            .await
            .unwrap();

        assert_eq!(preview.total_count, 3);
        assert_eq!(preview.total_price, Money::from_minor(4500));
        assert_eq!(preview.payable, Money::from_minor(5500));
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);

        let err = orchestrator.preview(None, &[ItemId::new(1)]).await.unwrap_err();
        assert_eq!(err.code(), ResultCode::NotAuthenticated);
    }
}
