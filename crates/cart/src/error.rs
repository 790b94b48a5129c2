//! Cart error types.

use common::ItemId;
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be a positive integer.
    #[error("Invalid quantity: {0} (must be greater than 0)")]
    InvalidQuantity(i64),

    /// The item is not in the catalog.
    #[error("Item not found: {0}")]
    ItemNotFound(ItemId),

    /// The requested quantity exceeds current stock.
    #[error("Insufficient stock for item {item_id}: requested {requested}, available {available}")]
    InsufficientStock {
        item_id: ItemId,
        requested: u32,
        available: u32,
    },

    /// The backing key-value store is unavailable.
    #[error("Cart store unavailable: {0}")]
    Unavailable(String),

    /// Redis error.
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Catalog lookup error.
    #[error("Catalog error: {0}")]
    Catalog(#[from] StoreError),
}

/// Convenience type alias for cart results.
pub type Result<T> = std::result::Result<T, CartError>;
