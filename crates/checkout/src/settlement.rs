//! Payment settlement loop.

use std::future::Future;
use std::time::Duration;

use common::{OrderId, UserId};
use domain::OrderStatus;
use serde::Serialize;
use store::{OrderStore, StoreTransaction};
use tracing::{debug, info, instrument, warn};

use crate::error::SettlementError;
use crate::gateway::{PaymentGateway, TradeState};
use crate::query::owned_order;

/// Poll cadence and wait cap for settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementConfig {
    pub poll_interval: Duration,
    /// Total time the loop may wait for a terminal answer.
    pub max_wait: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(60),
        }
    }
}

/// Terminal, successful settlement result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    /// This call moved the order to `awaiting_review`.
    Settled { trade_no: String },
    /// The order had already been settled; nothing was written.
    AlreadySettled { trade_no: Option<String> },
}

impl SettlementOutcome {
    pub fn trade_no(&self) -> Option<&str> {
        match self {
            SettlementOutcome::Settled { trade_no } => Some(trade_no),
            SettlementOutcome::AlreadySettled { trade_no } => trade_no.as_deref(),
        }
    }
}

/// Polls the gateway until an unpaid order's trade reaches a terminal state.
///
/// Waiting between polls is a timer, never a blocked thread. The whole loop
/// is capped by [`SettlementConfig::max_wait`] and stops as soon as the
/// caller's cancellation future completes.
pub struct SettlementLoop<S, G> {
    store: S,
    gateway: G,
    config: SettlementConfig,
}

impl<S, G> SettlementLoop<S, G>
where
    S: OrderStore,
    G: PaymentGateway,
{
    pub fn new(store: S, gateway: G, config: SettlementConfig) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Settles `order_id` for its owner.
    #[instrument(skip(self, cancel))]
    pub async fn settle<F>(
        &self,
        user_id: UserId,
        order_id: OrderId,
        cancel: F,
    ) -> Result<SettlementOutcome, SettlementError>
    where
        F: Future<Output = ()> + Send,
    {
        let order = owned_order(&self.store, user_id, order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;

        if !order.pay_method.is_gateway_integrated() {
            return Err(SettlementError::NotGatewayIntegrated(order.pay_method));
        }
        if order.status.is_paid() {
            debug!(%order_id, "order already settled");
            record_outcome("already_settled");
            return Ok(SettlementOutcome::AlreadySettled {
                trade_no: order.gateway_trade_no,
            });
        }
        if order.ensure_transition(OrderStatus::AwaitingReview).is_err() {
            return Err(SettlementError::InvalidStatus {
                order_id,
                status: order.status,
            });
        }

        let max_wait = self.config.max_wait;
        let result = tokio::select! {
            polled = tokio::time::timeout(max_wait, self.poll(order_id)) => {
                polled.unwrap_or_else(|_| Err(SettlementError::PaymentTimeout(max_wait)))
            }
            () = cancel => Err(SettlementError::Cancelled),
        };

        match &result {
            Ok(outcome) => {
                info!(%order_id, trade_no = ?outcome.trade_no(), "payment settled");
                record_outcome(match outcome {
                    SettlementOutcome::Settled { .. } => "settled",
                    SettlementOutcome::AlreadySettled { .. } => "already_settled",
                });
            }
            Err(SettlementError::PaymentTimeout(_)) => {
                warn!(%order_id, ?max_wait, "payment still pending at wait cap");
                record_outcome("timeout");
            }
            Err(SettlementError::Cancelled) => {
                info!(%order_id, "settlement cancelled by caller");
                record_outcome("cancelled");
            }
            Err(err) => {
                warn!(%order_id, error = %err, "payment settlement failed");
                record_outcome("failed");
            }
        }
        result
    }

    async fn poll(&self, order_id: OrderId) -> Result<SettlementOutcome, SettlementError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            metrics::counter!("payment_polls_total").increment(1);

            let answer = self
                .gateway
                .query_trade(order_id)
                .await
                .map_err(|err| SettlementError::PaymentFailed(err.to_string()))?;

            match answer.classify() {
                TradeState::Paid { trade_no } => return self.record_paid(order_id, trade_no).await,
                TradeState::Pending => {
                    debug!(%order_id, attempt, code = %answer.code, "trade pending");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                TradeState::Failed { reason } => {
                    return Err(SettlementError::PaymentFailed(reason));
                }
            }
        }
    }

    /// Moves the order to `awaiting_review` unless another poller already did.
    async fn record_paid(
        &self,
        order_id: OrderId,
        trade_no: String,
    ) -> Result<SettlementOutcome, SettlementError> {
        let mut tx = self.store.begin().await?;
        let affected = tx
            .transition_status(
                order_id,
                OrderStatus::Unpaid,
                OrderStatus::AwaitingReview,
                Some(trade_no.as_str()),
            )
            .await?;
        tx.commit().await?;

        if affected == 1 {
            return Ok(SettlementOutcome::Settled { trade_no });
        }

        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))?;
        if order.status.is_paid() {
            Ok(SettlementOutcome::AlreadySettled {
                trade_no: order.gateway_trade_no,
            })
        } else {
            Err(SettlementError::InvalidStatus {
                order_id,
                status: order.status,
            })
        }
    }
}

fn record_outcome(outcome: &'static str) {
    metrics::counter!("payment_settlements_total", "outcome" => outcome).increment(1);
}
