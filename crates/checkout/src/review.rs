//! Review submission and order closing.

use common::{OrderId, UserId};
use domain::{Order, OrderStatus, ReviewComment};
use store::{OrderStore, StoreTransaction};
use tracing::{debug, info, instrument};

use crate::error::TransitionError;
use crate::query::owned_order;

/// Buyer-driven transitions after commit: `awaiting_review -> completed`
/// and `unpaid -> closed`.
pub struct ReviewService<S> {
    store: S,
}

impl<S: OrderStore> ReviewService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Records review comments and completes the order, atomically.
    ///
    /// Comments naming items that are not on the order are skipped.
    #[instrument(skip(self, comments), fields(comments = comments.len()))]
    pub async fn submit(
        &self,
        user_id: UserId,
        order_id: OrderId,
        comments: &[ReviewComment],
    ) -> Result<(), TransitionError> {
        let order = self.load(user_id, order_id).await?;
        order
            .ensure_transition(OrderStatus::Completed)
            .map_err(|_| invalid(&order))?;

        let mut tx = self.store.begin().await?;
        for comment in comments {
            let affected = tx
                .set_line_comment(order_id, comment.item_id, &comment.text)
                .await?;
            if affected == 0 {
                debug!(%order_id, item_id = %comment.item_id, "comment for item not on order skipped");
            }
        }

        let moved = tx
            .transition_status(
                order_id,
                OrderStatus::AwaitingReview,
                OrderStatus::Completed,
                None,
            )
            .await?;
        if moved == 0 {
            tx.rollback().await?;
            return Err(self.reload_invalid(order_id).await);
        }
        tx.commit().await?;

        info!(%order_id, "order reviewed");
        Ok(())
    }

    /// Closes an unpaid order and returns its reserved stock.
    ///
    /// Sales counters are left untouched.
    #[instrument(skip(self))]
    pub async fn close(&self, user_id: UserId, order_id: OrderId) -> Result<(), TransitionError> {
        let order = self.load(user_id, order_id).await?;
        order
            .ensure_transition(OrderStatus::Closed)
            .map_err(|_| invalid(&order))?;
        let lines = self.store.get_order_lines(order_id).await?;

        let mut tx = self.store.begin().await?;
        let moved = tx
            .transition_status(order_id, OrderStatus::Unpaid, OrderStatus::Closed, None)
            .await?;
        if moved == 0 {
            tx.rollback().await?;
            return Err(self.reload_invalid(order_id).await);
        }
        for line in &lines {
            tx.release_stock(line.item_id, line.quantity).await?;
        }
        tx.commit().await?;

        info!(%order_id, lines = lines.len(), "order closed");
        Ok(())
    }

    async fn load(&self, user_id: UserId, order_id: OrderId) -> Result<Order, TransitionError> {
        owned_order(&self.store, user_id, order_id)
            .await?
            .ok_or(TransitionError::OrderNotFound(order_id))
    }

    async fn reload_invalid(&self, order_id: OrderId) -> TransitionError {
        match self.store.get_order(order_id).await {
            Ok(Some(order)) => invalid(&order),
            Ok(None) => TransitionError::OrderNotFound(order_id),
            Err(err) => err.into(),
        }
    }
}

fn invalid(order: &Order) -> TransitionError {
    TransitionError::InvalidStatus {
        order_id: order.order_id,
        status: order.status,
    }
}
