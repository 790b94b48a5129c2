use common::{IdempotencyKey, OrderId};
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An order with the same (user, idempotency key) already exists.
    #[error("Idempotency key already used: {0}")]
    DuplicateIdempotencyKey(IdempotencyKey),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// A stored row could not be mapped onto the domain model.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// The store rejected the operation (also used for injected faults).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
