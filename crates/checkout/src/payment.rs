//! Payment requests for unpaid gateway orders.

use common::{OrderId, UserId};
use domain::OrderStatus;
use store::OrderStore;
use tracing::{info, instrument};

use crate::error::SettlementError;
use crate::gateway::PaymentGateway;
use crate::query::owned_order;

/// Opens gateway payments for the buyer to complete.
pub struct PaymentService<S, G> {
    store: S,
    gateway: G,
}

impl<S, G> PaymentService<S, G>
where
    S: OrderStore,
    G: PaymentGateway,
{
    pub fn new(store: S, gateway: G) -> Self {
        Self { store, gateway }
    }

    /// Requests payment of the order's total plus shipping and returns the
    /// URL the buyer is redirected to.
    #[instrument(skip(self))]
    pub async fn request_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<String, SettlementError> {
        let order = owned_order(&self.store, user_id, order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        if !order.pay_method.is_gateway_integrated() {
            return Err(SettlementError::NotGatewayIntegrated(order.pay_method));
        }
        if order.ensure_transition(OrderStatus::AwaitingReview).is_err() {
            return Err(SettlementError::InvalidStatus {
                order_id,
                status: order.status,
            });
        }

        let amount = order.payable_total();
        let subject = format!("Storefront order {order_id}");
        let url = self
            .gateway
            .create_payment_request(order_id, amount, &subject)
            .await
            .map_err(|err| SettlementError::PaymentFailed(err.to_string()))?;

        info!(%order_id, %amount, "payment requested");
        Ok(url)
    }
}
