//! Order header, line items and status machine.

mod aggregate;
mod commands;
mod state;
mod value_objects;

pub use aggregate::{Order, OrderTotals};
pub use commands::{CommitRequest, ReviewComment};
pub use state::OrderStatus;
pub use value_objects::{OrderLineItem, PayMethod};

use thiserror::Error;

/// Errors raised by order invariants.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Status may only move forward.
    #[error("Invalid status transition: cannot move from {current} to {requested}")]
    InvalidStatusTransition {
        current: OrderStatus,
        requested: OrderStatus,
    },

    /// Unrecognized payment method code.
    #[error("Unknown pay method code: {0}")]
    UnknownPayMethod(i16),

    /// Unrecognized stored status.
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
