//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cart::CartError;
use checkout::{CommitError, ResultCode, SettlementError, TransitionError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
///
/// Every body carries a machine-readable `code` next to the message.
#[derive(Debug)]
pub enum ApiError {
    /// No caller identity on the request.
    NotAuthenticated,
    /// Bad request from the client.
    BadRequest(String),
    /// Resource not found.
    NotFound(String),
    /// Order commit error.
    Commit(CommitError),
    /// Cart error.
    Cart(CartError),
    /// Payment request or settlement error.
    Settlement(SettlementError),
    /// Review or close error.
    Transition(TransitionError),
    /// Store error.
    Store(StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut extra = None;
        let (status, code, message) = match self {
            ApiError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                ResultCode::NotAuthenticated.as_str(),
                "Not authenticated".to_string(),
            ),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Commit(err) => {
                if let CommitError::DuplicateSubmission(order_id) = &err {
                    extra = Some(("order_id", order_id.to_string()));
                }
                let code = err.code();
                (commit_status(code), code.as_str(), err.to_string())
            }
            ApiError::Cart(err) => cart_error_to_response(err),
            ApiError::Settlement(err) => settlement_error_to_response(err),
            ApiError::Transition(err) => transition_error_to_response(err),
            ApiError::Store(err) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", err.to_string()),
        };

        if status.is_server_error() {
            tracing::error!(%code, error = %message, "internal server error");
        }

        let mut body = serde_json::json!({ "code": code, "error": message });
        if let Some((key, value)) = extra {
            body[key] = serde_json::Value::String(value);
        }
        (status, axum::Json(body)).into_response()
    }
}

/// HTTP status for a commit result code.
pub fn commit_status(code: ResultCode) -> StatusCode {
    match code {
        ResultCode::Success => StatusCode::CREATED,
        ResultCode::NotAuthenticated => StatusCode::UNAUTHORIZED,
        ResultCode::IncompleteData | ResultCode::InvalidAddress | ResultCode::InvalidPayMethod => {
            StatusCode::BAD_REQUEST
        }
        ResultCode::ItemNotFound => StatusCode::NOT_FOUND,
        ResultCode::InsufficientStock | ResultCode::DuplicateSubmission => StatusCode::CONFLICT,
        ResultCode::CommitFailed => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn cart_error_to_response(err: CartError) -> (StatusCode, &'static str, String) {
    match &err {
        CartError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "INVALID_QUANTITY", err.to_string()),
        CartError::ItemNotFound(_) => (StatusCode::NOT_FOUND, "ITEM_NOT_FOUND", err.to_string()),
        CartError::InsufficientStock { .. } => {
            (StatusCode::CONFLICT, "INSUFFICIENT_STOCK", err.to_string())
        }
        CartError::Unavailable(_) | CartError::Redis(_) | CartError::Catalog(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", err.to_string())
        }
    }
}

fn settlement_error_to_response(err: SettlementError) -> (StatusCode, &'static str, String) {
    match &err {
        SettlementError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        SettlementError::NotGatewayIntegrated(_) => {
            (StatusCode::BAD_REQUEST, "NOT_GATEWAY_INTEGRATED", err.to_string())
        }
        SettlementError::InvalidStatus { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATUS", err.to_string())
        }
        SettlementError::PaymentFailed(_) => {
            (StatusCode::BAD_GATEWAY, "PAYMENT_FAILED", err.to_string())
        }
        SettlementError::PaymentTimeout(_) => {
            (StatusCode::GATEWAY_TIMEOUT, "PAYMENT_TIMEOUT", err.to_string())
        }
        SettlementError::Cancelled => {
            (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED", err.to_string())
        }
        SettlementError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", err.to_string())
        }
    }
}

fn transition_error_to_response(err: TransitionError) -> (StatusCode, &'static str, String) {
    match &err {
        TransitionError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string()),
        TransitionError::InvalidStatus { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATUS", err.to_string())
        }
        TransitionError::Store(_) => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", err.to_string())
        }
    }
}

impl From<CommitError> for ApiError {
    fn from(err: CommitError) -> Self {
        ApiError::Commit(err)
    }
}

impl From<CartError> for ApiError {
    fn from(err: CartError) -> Self {
        ApiError::Cart(err)
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        ApiError::Settlement(err)
    }
}

impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        ApiError::Transition(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Store(err)
    }
}
