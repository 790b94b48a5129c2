//! Inventory ledger: optimistic stock reservation.

use common::{ItemId, Money};
use store::StoreTransaction;
use tracing::{debug, instrument, warn};

use crate::error::ReservationError;
use crate::retry::RetryPolicy;

/// A successful reservation of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub item_id: ItemId,
    pub quantity: u32,
    /// Unit price observed in the same read that won the swap.
    pub unit_price: Money,
    /// Attempts taken, including the successful one.
    pub attempts: u32,
}

/// Owns the read-check-swap cycle on an item's stock and sales counters.
///
/// A row is never locked for longer than a single conditional update. When
/// the update affects no rows a concurrent writer won; the ledger re-reads
/// and tries again, up to the policy's bound.
#[derive(Debug, Clone, Default)]
pub struct InventoryLedger {
    retry: RetryPolicy,
}

impl InventoryLedger {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Takes `quantity` units of `item_id` inside `tx`.
    ///
    /// Insufficient stock is reported without mutating anything and without
    /// retrying.
    #[instrument(skip(self, tx))]
    pub async fn reserve<T>(
        &self,
        tx: &mut T,
        item_id: ItemId,
        quantity: u32,
    ) -> Result<Reservation, ReservationError>
    where
        T: StoreTransaction + ?Sized,
    {
        let attempts = self.retry.attempts();

        for attempt in 1..=attempts {
            let observed = tx
                .get_item(item_id)
                .await?
                .ok_or(ReservationError::ItemNotFound(item_id))?;

            if !observed.has_stock_for(quantity) {
                return Err(ReservationError::InsufficientStock {
                    item_id,
                    requested: quantity,
                    available: observed.stock,
                });
            }

            if tx.compare_and_swap_stock(&observed, quantity).await? == 1 {
                metrics::counter!("inventory_reservations_total").increment(1);
                debug!(%item_id, quantity, attempt, "stock reserved");
                return Ok(Reservation {
                    item_id,
                    quantity,
                    unit_price: observed.price,
                    attempts: attempt,
                });
            }

            metrics::counter!("inventory_cas_conflicts_total").increment(1);
            warn!(%item_id, attempt, observed_stock = observed.stock, "stock changed concurrently");

            if attempt < attempts {
                let delay = self.retry.delay_after(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        warn!(%item_id, attempts, "reservation retries exhausted");
        Err(ReservationError::Exhausted { item_id, attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::InventoryItem;
    use store::{InMemoryStore, OrderStore};

    fn store_with_item(stock: u32) -> InMemoryStore {
        let store = InMemoryStore::new();
        store.upsert_item(InventoryItem::new(
            ItemId::new(1),
            "Strawberries",
            Money::from_minor(2500),
            stock,
        ));
        store
    }

    #[tokio::test]
    async fn test_reserve_moves_stock_to_sales() {
        let store = store_with_item(5);
        let ledger = InventoryLedger::new(RetryPolicy::immediate(3));

        let mut tx = store.begin().await.unwrap();
        let reservation = ledger.reserve(&mut tx, ItemId::new(1), 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(reservation.unit_price, Money::from_minor(2500));
        assert_eq!(reservation.attempts, 1);
        let item = store.item(ItemId::new(1)).unwrap();
        assert_eq!((item.stock, item.sales), (3, 2));
    }

    #[tokio::test]
    async fn test_insufficient_stock_does_not_mutate() {
        let store = store_with_item(1);
        let ledger = InventoryLedger::default();

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve(&mut tx, ItemId::new(1), 2).await.unwrap_err();
        tx.commit().await.unwrap();

        assert!(matches!(
            err,
            ReservationError::InsufficientStock {
                requested: 2,
                available: 1,
                ..
            }
        ));
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 1);
    }

    #[tokio::test]
    async fn test_unknown_item() {
        let store = store_with_item(1);
        let ledger = InventoryLedger::default();

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve(&mut tx, ItemId::new(2), 1).await.unwrap_err();
        assert!(matches!(err, ReservationError::ItemNotFound(_)));
    }

    #[tokio::test]
    async fn test_conflicts_are_retried() {
        let store = store_with_item(5);
        store.force_stock_conflicts(ItemId::new(1), 2);
        let ledger = InventoryLedger::new(RetryPolicy::immediate(3));

        let mut tx = store.begin().await.unwrap();
        let reservation = ledger.reserve(&mut tx, ItemId::new(1), 1).await.unwrap();

        assert_eq!(reservation.attempts, 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let store = store_with_item(5);
        store.force_stock_conflicts(ItemId::new(1), 3);
        let ledger = InventoryLedger::new(RetryPolicy::immediate(3));

        let mut tx = store.begin().await.unwrap();
        let err = ledger.reserve(&mut tx, ItemId::new(1), 1).await.unwrap_err();
        tx.rollback().await.unwrap();

        assert!(matches!(err, ReservationError::Exhausted { attempts: 3, .. }));
        assert_eq!(store.item(ItemId::new(1)).unwrap().stock, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let store = store_with_item(5);
        store.force_stock_conflicts(ItemId::new(1), 1);
        let ledger = InventoryLedger::new(RetryPolicy {
            jitter: 0.0,
            ..RetryPolicy::default()
        });

        let started = tokio::time::Instant::now();
        let mut tx = store.begin().await.unwrap();
        ledger.reserve(&mut tx, ItemId::new(1), 1).await.unwrap();

        assert!(started.elapsed() >= std::time::Duration::from_millis(5));
    }
}
