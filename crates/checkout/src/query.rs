//! Read-side order lookups.

use common::{OrderId, UserId};
use domain::Order;
use store::OrderStore;

use crate::views::OrderDetail;

/// Loads an order only if it belongs to `user_id`.
pub(crate) async fn owned_order<S>(
    store: &S,
    user_id: UserId,
    order_id: OrderId,
) -> store::Result<Option<Order>>
where
    S: OrderStore + ?Sized,
{
    Ok(store
        .get_order(order_id)
        .await?
        .filter(|order| order.belongs_to(user_id)))
}

/// Order detail and history lookups for the owning user.
#[derive(Clone)]
pub struct OrderQueries<S> {
    store: S,
}

impl<S: OrderStore> OrderQueries<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// One order with its lines. Orders of other users are not visible.
    pub async fn detail(&self, user_id: UserId, order_id: OrderId) -> store::Result<Option<OrderDetail>> {
        let Some(order) = owned_order(&self.store, user_id, order_id).await? else {
            return Ok(None);
        };
        let lines = self.store.get_order_lines(order_id).await?;
        Ok(Some(OrderDetail::new(&order, &lines)))
    }

    /// The user's orders, newest first.
    pub async fn list(&self, user_id: UserId) -> store::Result<Vec<OrderDetail>> {
        let orders = self.store.list_orders_for_user(user_id).await?;
        let mut details = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = self.store.get_order_lines(order.order_id).await?;
            details.push(OrderDetail::new(&order, &lines));
        }
        Ok(details)
    }
}
