//! Checkout error types and commit result codes.

use std::time::Duration;

use cart::CartError;
use common::{AddressId, ItemId, OrderId};
use domain::{OrderStatus, PayMethod};
use serde::{Deserialize, Serialize};
use store::StoreError;
use thiserror::Error;

/// Result discriminator reported for every commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    NotAuthenticated,
    IncompleteData,
    InvalidAddress,
    InvalidPayMethod,
    ItemNotFound,
    InsufficientStock,
    DuplicateSubmission,
    CommitFailed,
    Success,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultCode::NotAuthenticated => "NOT_AUTHENTICATED",
            ResultCode::IncompleteData => "INCOMPLETE_DATA",
            ResultCode::InvalidAddress => "INVALID_ADDRESS",
            ResultCode::InvalidPayMethod => "INVALID_PAY_METHOD",
            ResultCode::ItemNotFound => "ITEM_NOT_FOUND",
            ResultCode::InsufficientStock => "INSUFFICIENT_STOCK",
            ResultCode::DuplicateSubmission => "DUPLICATE_SUBMISSION",
            ResultCode::CommitFailed => "COMMIT_FAILED",
            ResultCode::Success => "SUCCESS",
        }
    }
}

impl std::fmt::Display for ResultCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by a single-item reservation.
#[derive(Debug, Error)]
pub enum ReservationError {
    /// The item does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Requested quantity exceeds the observed stock.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    /// Every compare-and-swap attempt lost to a concurrent writer.
    #[error("Reservation of item {item_id} failed after {attempts} conflicting attempts")]
    Exhausted { item_id: ItemId, attempts: u32 },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors that abort an order commit. Each maps onto one [`ResultCode`].
#[derive(Debug, Error)]
pub enum CommitError {
    /// No authenticated caller.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Required request fields are missing.
    #[error("Incomplete data: {0}")]
    IncompleteData(String),

    /// The address is unknown or belongs to another user.
    #[error("Invalid address: {0}")]
    InvalidAddress(AddressId),

    /// The payment method code is not recognized.
    #[error("Invalid pay method: {0}")]
    InvalidPayMethod(String),

    /// An item does not exist.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// Not enough stock for a line.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    /// Retries on stock conflicts were exhausted.
    #[error("Reservation failed for item {item_id} after {attempts} attempts")]
    ReservationFailed { item_id: ItemId, attempts: u32 },

    /// An order was already committed under this idempotency key.
    #[error("Duplicate submission of order {0}")]
    DuplicateSubmission(OrderId),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cart error.
    #[error("Cart error: {0}")]
    Cart(#[from] CartError),
}

impl CommitError {
    /// Result code reported to the caller.
    pub fn code(&self) -> ResultCode {
        match self {
            CommitError::NotAuthenticated => ResultCode::NotAuthenticated,
            CommitError::IncompleteData(_) => ResultCode::IncompleteData,
            CommitError::InvalidAddress(_) => ResultCode::InvalidAddress,
            CommitError::InvalidPayMethod(_) => ResultCode::InvalidPayMethod,
            CommitError::ItemNotFound(_) => ResultCode::ItemNotFound,
            CommitError::InsufficientStock { .. } => ResultCode::InsufficientStock,
            CommitError::DuplicateSubmission(_) => ResultCode::DuplicateSubmission,
            CommitError::ReservationFailed { .. }
            | CommitError::Store(_)
            | CommitError::Cart(_) => ResultCode::CommitFailed,
        }
    }
}

impl From<ReservationError> for CommitError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::ItemNotFound(item_id) => CommitError::ItemNotFound(item_id),
            ReservationError::InsufficientStock {
                item_id,
                requested,
                available,
            } => CommitError::InsufficientStock {
                item_id,
                requested,
                available,
            },
            ReservationError::Exhausted { item_id, attempts } => {
                CommitError::ReservationFailed { item_id, attempts }
            }
            ReservationError::Store(err) => CommitError::Store(err),
        }
    }
}

/// Errors raised while requesting or settling a payment.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// The order does not exist or belongs to another user.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order's payment method is not settled through the gateway.
    #[error("Pay method {0:?} is not gateway-integrated")]
    NotGatewayIntegrated(PayMethod),

    /// The order is not in a state that accepts this operation.
    #[error("Order {order_id} is {status}")]
    InvalidStatus {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// The gateway reported a terminal failure or could not be reached.
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// The gateway kept reporting a pending trade past the wait cap.
    #[error("Payment still pending after {0:?}")]
    PaymentTimeout(Duration),

    /// The caller abandoned the wait.
    #[error("Settlement cancelled")]
    Cancelled,

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Errors raised by buyer-driven transitions: review submission and closing.
#[derive(Debug, Error)]
pub enum TransitionError {
    /// The order does not exist or belongs to another user.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The order is not in a state that accepts this operation.
    #[error("Order {order_id} is {status}")]
    InvalidStatus {
        order_id: OrderId,
        status: OrderStatus,
    },

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for commit results.
pub type Result<T> = std::result::Result<T, CommitError>;
