//! Payment gateway contract and a scripted in-memory gateway.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{Money, OrderId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Gateway code for a well-formed answer.
pub const CODE_SUCCESS: &str = "10000";
/// Gateway code for a trade the buyer has not opened yet.
pub const CODE_TRADE_NOT_EXIST: &str = "40004";
pub const TRADE_SUCCESS: &str = "TRADE_SUCCESS";
pub const WAIT_BUYER_PAY: &str = "WAIT_BUYER_PAY";

/// Errors talking to the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway could not be reached.
    #[error("Gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with something unparseable.
    #[error("Malformed gateway response: {0}")]
    Malformed(String),
}

/// Raw answer of the gateway's trade-query operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeQuery {
    pub code: String,
    pub trade_status: Option<String>,
    pub trade_no: Option<String>,
}

impl TradeQuery {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            trade_status: None,
            trade_no: None,
        }
    }

    /// A paid trade.
    pub fn paid(trade_no: impl Into<String>) -> Self {
        Self {
            code: CODE_SUCCESS.to_string(),
            trade_status: Some(TRADE_SUCCESS.to_string()),
            trade_no: Some(trade_no.into()),
        }
    }

    /// A trade the buyer has not opened yet.
    pub fn not_created() -> Self {
        Self::new(CODE_TRADE_NOT_EXIST)
    }

    /// A trade waiting for the buyer to pay.
    pub fn awaiting_payment() -> Self {
        Self {
            code: CODE_SUCCESS.to_string(),
            trade_status: Some(WAIT_BUYER_PAY.to_string()),
            trade_no: None,
        }
    }

    /// Decodes a raw trade-query response body.
    ///
    /// Bodies that are not JSON, lack a field, or carry a blank code are
    /// reported as [`GatewayError::Malformed`].
    pub fn decode(body: &[u8]) -> Result<Self, GatewayError> {
        let answer: TradeQuery =
            serde_json::from_slice(body).map_err(|err| GatewayError::Malformed(err.to_string()))?;
        if answer.code.trim().is_empty() {
            return Err(GatewayError::Malformed("blank response code".to_string()));
        }
        Ok(answer)
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.trade_status = Some(status.into());
        self
    }

    /// Classifies the answer.
    ///
    /// A success without a trade number is malformed and counts as a failure.
    pub fn classify(&self) -> TradeState {
        match (self.code.as_str(), self.trade_status.as_deref()) {
            (CODE_SUCCESS, Some(TRADE_SUCCESS)) => match &self.trade_no {
                Some(trade_no) if !trade_no.is_empty() => TradeState::Paid {
                    trade_no: trade_no.clone(),
                },
                _ => TradeState::Failed {
                    reason: "success without trade number".to_string(),
                },
            },
            (CODE_TRADE_NOT_EXIST, _) | (CODE_SUCCESS, Some(WAIT_BUYER_PAY)) => TradeState::Pending,
            (code, status) => TradeState::Failed {
                reason: format!("code {code}, trade status {}", status.unwrap_or("none")),
            },
        }
    }
}

/// Settlement view of a trade-query answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TradeState {
    Paid { trade_no: String },
    Pending,
    Failed { reason: String },
}

/// External payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment for `order_id` and returns the URL to redirect the buyer to.
    async fn create_payment_request(
        &self,
        order_id: OrderId,
        amount: Money,
        subject: &str,
    ) -> Result<String, GatewayError>;

    /// Queries the trade opened for `order_id`.
    async fn query_trade(&self, order_id: OrderId) -> Result<TradeQuery, GatewayError>;
}

#[async_trait]
impl<T: PaymentGateway + ?Sized> PaymentGateway for Arc<T> {
    async fn create_payment_request(
        &self,
        order_id: OrderId,
        amount: Money,
        subject: &str,
    ) -> Result<String, GatewayError> {
        (**self)
            .create_payment_request(order_id, amount, subject)
            .await
    }

    async fn query_trade(&self, order_id: OrderId) -> Result<TradeQuery, GatewayError> {
        (**self).query_trade(order_id).await
    }
}

/// A payment request recorded by [`ScriptedGateway`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequestRecord {
    pub order_id: OrderId,
    pub amount: Money,
    pub subject: String,
}

/// Payment requests kept by [`ScriptedGateway`]; older ones are dropped.
pub const MAX_RECORDED_REQUESTS: usize = 256;

#[derive(Debug)]
enum Scripted {
    Answer(TradeQuery),
    Unreachable(String),
    /// Undecoded response body.
    Raw(String),
}

#[derive(Debug)]
struct ScriptedState {
    script: VecDeque<Scripted>,
    fallback: Option<TradeQuery>,
    queries: usize,
    requests: VecDeque<PaymentRequestRecord>,
}

/// In-memory gateway answering trade queries from a script.
///
/// Queued answers are returned in order; once the script runs dry every
/// query gets the fallback answer. Without a fallback, a dry script answers
/// with a paid trade numbered after the order, like a sandbox that settles
/// instantly.
#[derive(Debug, Clone)]
pub struct ScriptedGateway {
    base_url: String,
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            state: Arc::new(Mutex::new(ScriptedState {
                script: VecDeque::new(),
                fallback: None,
                queries: 0,
                requests: VecDeque::new(),
            })),
        }
    }

    /// Queues one answer.
    pub fn push(&self, answer: TradeQuery) -> &Self {
        self.lock().script.push_back(Scripted::Answer(answer));
        self
    }

    /// Queues `times` copies of one answer.
    pub fn push_repeated(&self, answer: TradeQuery, times: usize) -> &Self {
        let mut state = self.lock();
        for _ in 0..times {
            state.script.push_back(Scripted::Answer(answer.clone()));
        }
        drop(state);
        self
    }

    /// Queues a transport failure.
    pub fn push_unreachable(&self, reason: impl Into<String>) -> &Self {
        self.lock().script.push_back(Scripted::Unreachable(reason.into()));
        self
    }

    /// Queues a raw response body, decoded when it is served.
    pub fn push_raw(&self, body: impl Into<String>) -> &Self {
        self.lock().script.push_back(Scripted::Raw(body.into()));
        self
    }

    /// Answer used once the script is exhausted.
    pub fn set_fallback(&self, answer: TradeQuery) {
        self.lock().fallback = Some(answer);
    }

    /// Number of trade queries received.
    pub fn query_count(&self) -> usize {
        self.lock().queries
    }

    /// The most recent payment requests, oldest first, at most
    /// [`MAX_RECORDED_REQUESTS`] of them.
    pub fn payment_requests(&self) -> Vec<PaymentRequestRecord> {
        self.lock().requests.iter().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_answer(&self, order_id: OrderId) -> Result<TradeQuery, GatewayError> {
        let mut state = self.lock();
        state.queries += 1;
        match state.script.pop_front() {
            Some(Scripted::Answer(answer)) => Ok(answer),
            Some(Scripted::Unreachable(reason)) => Err(GatewayError::Transport(reason)),
            Some(Scripted::Raw(body)) => TradeQuery::decode(body.as_bytes()),
            None => Ok(state
                .fallback
                .clone()
                .unwrap_or_else(|| TradeQuery::paid(format!("SANDBOX{}", order_id.as_uuid().simple())))),
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment_request(
        &self,
        order_id: OrderId,
        amount: Money,
        subject: &str,
    ) -> Result<String, GatewayError> {
        let mut state = self.lock();
        if state.requests.len() == MAX_RECORDED_REQUESTS {
            state.requests.pop_front();
        }
        state.requests.push_back(PaymentRequestRecord {
            order_id,
            amount,
            subject: subject.to_string(),
        });
        drop(state);
        Ok(format!(
            "{}?out_trade_no={order_id}&total_amount={amount}",
            self.base_url
        ))
    }

    async fn query_trade(&self, order_id: OrderId) -> Result<TradeQuery, GatewayError> {
        self.next_answer(order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            TradeQuery::paid("T1").classify(),
            TradeState::Paid {
                trade_no: "T1".to_string()
            }
        );
        assert_eq!(TradeQuery::not_created().classify(), TradeState::Pending);
        assert_eq!(TradeQuery::awaiting_payment().classify(), TradeState::Pending);
        assert!(matches!(
            TradeQuery::new(CODE_SUCCESS).with_status("TRADE_CLOSED").classify(),
            TradeState::Failed { .. }
        ));
        assert!(matches!(
            TradeQuery::new("20000").classify(),
            TradeState::Failed { .. }
        ));
    }

    #[test]
    fn test_success_without_trade_no_is_failure() {
        let answer = TradeQuery::new(CODE_SUCCESS).with_status(TRADE_SUCCESS);
        assert!(matches!(answer.classify(), TradeState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_script_then_fallback() {
        let gateway = ScriptedGateway::new("https://gateway.test/pay");
        gateway
            .push(TradeQuery::not_created())
            .push_unreachable("connection reset");
        gateway.set_fallback(TradeQuery::awaiting_payment());
        let order_id = OrderId::generate();

        assert_eq!(
            gateway.query_trade(order_id).await.unwrap(),
            TradeQuery::not_created()
        );
        assert!(matches!(
            gateway.query_trade(order_id).await,
            Err(GatewayError::Transport(_))
        ));
        assert_eq!(
            gateway.query_trade(order_id).await.unwrap(),
            TradeQuery::awaiting_payment()
        );
        assert_eq!(gateway.query_count(), 3);
    }

    #[tokio::test]
    async fn test_payment_request_is_recorded() {
        let gateway = ScriptedGateway::new("https://gateway.test/pay");
        let order_id = OrderId::generate();

        let url = gateway
            .create_payment_request(order_id, Money::from_minor(5500), "Storefront order")
            .await
            .unwrap();

        assert!(url.starts_with("https://gateway.test/pay?out_trade_no="));
        assert!(url.ends_with("total_amount=55.00"));
        assert_eq!(gateway.payment_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_recorded_requests_are_bounded() {
        let gateway = ScriptedGateway::new("https://gateway.test/pay");
        let orders: Vec<OrderId> = (0..MAX_RECORDED_REQUESTS + 10)
            .map(|_| OrderId::generate())
            .collect();

        for order_id in &orders {
            gateway
                .create_payment_request(*order_id, Money::from_minor(100), "Storefront order")
                .await
                .unwrap();
        }

        let recorded = gateway.payment_requests();
        assert_eq!(recorded.len(), MAX_RECORDED_REQUESTS);
        assert_eq!(recorded[0].order_id, orders[10]);
        assert_eq!(recorded.last().unwrap().order_id, *orders.last().unwrap());
    }

    #[test]
    fn test_decode_response_bodies() {
        let answer = TradeQuery::decode(
            br#"{"code":"10000","trade_status":"TRADE_SUCCESS","trade_no":"T9"}"#,
        )
        .unwrap();
        assert_eq!(answer, TradeQuery::paid("T9"));

        let bodies: [&[u8]; 3] = [
            b"<html>busy</html>",
            br#"{"trade_status":"TRADE_SUCCESS"}"#,
            br#"{"code":"  "}"#,
        ];
        for body in bodies {
            assert!(matches!(TradeQuery::decode(body), Err(GatewayError::Malformed(_))));
        }
    }

    #[tokio::test]
    async fn test_raw_script_entries_are_decoded() {
        let gateway = ScriptedGateway::new("https://gateway.test/pay");
        gateway.push_raw(r#"{"code":"40004"}"#).push_raw("not json");
        let order_id = OrderId::generate();

        assert_eq!(
            gateway.query_trade(order_id).await.unwrap(),
            TradeQuery::not_created()
        );
        assert!(matches!(
            gateway.query_trade(order_id).await,
            Err(GatewayError::Malformed(_))
        ));
    }
}
