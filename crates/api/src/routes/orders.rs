//! Order commit, payment and post-payment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use checkout::{CheckoutPreview, OrderDetail, ResultCode, SettlementOutcome};
use common::{AddressId, IdempotencyKey, ItemId, OrderId};
use domain::{CommitRequest, OrderStatus, ReviewComment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use store::OrderStore;

use crate::auth::MaybeUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Header that lets clients retry a commit without creating a second order.
pub const IDEMPOTENCY_HEADER: &str = "idempotency-key";

// -- Request types --

#[derive(Deserialize)]
pub struct PreviewRequest {
    pub item_ids: Vec<i64>,
}

/// Commit body. The pay method is kept loose so that an unknown value is
/// reported as `INVALID_PAY_METHOD` rather than as a decoding failure.
#[derive(Deserialize)]
pub struct CommitOrderRequest {
    pub address_id: Option<i64>,
    #[serde(default)]
    pub pay_method: Option<Value>,
    #[serde(default)]
    pub item_ids: Vec<i64>,
}

impl CommitOrderRequest {
    /// The submitted pay method as text: numbers and strings verbatim,
    /// anything else in its JSON form.
    fn pay_method_code(&self) -> Option<String> {
        match self.pay_method.as_ref()? {
            Value::Null => None,
            Value::String(code) => Some(code.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    #[serde(default)]
    pub comments: Vec<ReviewCommentRequest>,
}

#[derive(Deserialize)]
pub struct ReviewCommentRequest {
    pub item_id: i64,
    pub text: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct CommitResponse {
    pub code: ResultCode,
    pub order: OrderDetail,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub redirect_url: String,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order id: {raw}")))
}

fn item_ids(raw: &[i64]) -> Vec<ItemId> {
    raw.iter().copied().map(ItemId::new).collect()
}

fn idempotency_key(headers: &HeaderMap) -> Result<Option<IdempotencyKey>, &'static str> {
    let Some(value) = headers.get(IDEMPOTENCY_HEADER) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| "idempotency key must be visible ASCII")?;
    IdempotencyKey::new(value)
        .map(Some)
        .ok_or("idempotency key must not be empty")
}

// -- Handlers --

/// POST /orders/preview: prices selected cart items without reserving.
pub async fn preview<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Json(req): Json<PreviewRequest>,
) -> Result<Json<CheckoutPreview>, ApiError> {
    let preview = state
        .orchestrator
        .preview(user.0, &item_ids(&req.item_ids))
        .await?;
    Ok(Json(preview))
}

/// POST /orders: commits the selected cart items as one order.
///
/// The body is decoded here rather than by the `Json` extractor so that
/// every failure, malformed input included, answers with a result code.
pub async fn commit<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<CommitResponse>), ApiError> {
    let req: CommitOrderRequest = serde_json::from_slice(&body).map_err(|err| {
        state
            .orchestrator
            .reject_malformed(user.0, format!("malformed request body: {err}"))
    })?;
    let idempotency_key = idempotency_key(&headers)
        .map_err(|reason| state.orchestrator.reject_malformed(user.0, reason))?;

    let request = CommitRequest {
        user_id: user.0,
        address_id: req.address_id.map(AddressId::new),
        pay_method: req.pay_method_code(),
        item_ids: item_ids(&req.item_ids),
        idempotency_key,
    };

    let built = state.orchestrator.commit(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(CommitResponse {
            code: ResultCode::Success,
            order: OrderDetail::new(&built.order, &built.lines),
        }),
    ))
}

/// GET /orders: lists the caller's orders, newest first.
pub async fn list<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
) -> Result<Json<Vec<OrderDetail>>, ApiError> {
    let user_id = user.require()?;
    Ok(Json(state.queries.list(user_id).await?))
}

/// GET /orders/{id}: returns one of the caller's orders.
pub async fn get<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<OrderDetail>, ApiError> {
    let user_id = user.require()?;
    let order_id = parse_order_id(&id)?;
    state
        .queries
        .detail(user_id, order_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))
}

/// POST /orders/{id}/pay: opens a gateway payment for an unpaid order.
pub async fn pay<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let user_id = user.require()?;
    let order_id = parse_order_id(&id)?;
    let redirect_url = state.payments.request_payment(user_id, order_id).await?;
    Ok(Json(PaymentResponse { redirect_url }))
}

/// POST /orders/{id}/settle: waits for the gateway to report the payment.
///
/// Dropping the request (client disconnect) or shutting the server down
/// stops the polling.
pub async fn settle<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<SettlementOutcome>, ApiError> {
    let user_id = user.require()?;
    let order_id = parse_order_id(&id)?;
    let outcome = state
        .settlement
        .settle(user_id, order_id, state.shutdown.clone().requested())
        .await?;
    Ok(Json(outcome))
}

/// POST /orders/{id}/review: stores review comments and completes the order.
pub async fn review<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = user.require()?;
    let order_id = parse_order_id(&id)?;
    let comments: Vec<ReviewComment> = req
        .comments
        .into_iter()
        .map(|c| ReviewComment::new(ItemId::new(c.item_id), c.text))
        .collect();

    state.reviews.submit(user_id, order_id, &comments).await?;
    Ok(Json(StatusResponse {
        order_id,
        status: OrderStatus::Completed,
    }))
}

/// POST /orders/{id}/close: closes an unpaid order and releases its stock.
pub async fn close<S: OrderStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    user: MaybeUser,
    Path(id): Path<String>,
) -> Result<Json<StatusResponse>, ApiError> {
    let user_id = user.require()?;
    let order_id = parse_order_id(&id)?;
    state.reviews.close(user_id, order_id).await?;
    Ok(Json(StatusResponse {
        order_id,
        status: OrderStatus::Closed,
    }))
}
