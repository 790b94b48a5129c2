//! Domain model for the storefront checkout core.
//!
//! This crate is free of I/O. It provides:
//! - catalog rows read by checkout (`InventoryItem`, `Address`)
//! - the order header, line items and the forward-only status machine
//! - commit and review requests
//! - the shipping pricing policy

pub mod catalog;
pub mod order;
pub mod pricing;

pub use catalog::{Address, InventoryItem};
pub use order::{
    CommitRequest, Order, OrderError, OrderLineItem, OrderStatus, OrderTotals, PayMethod,
    ReviewComment,
};
pub use pricing::ShippingPolicy;
