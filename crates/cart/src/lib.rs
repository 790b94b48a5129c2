//! Shopping cart: a per-user mapping of item to quantity.
//!
//! The [`CartStore`] trait is the key-value contract the checkout core
//! consumes. [`RedisCartStore`] keeps one hash per user; the in-memory
//! implementation backs tests. [`CartService`] layers the storefront rules
//! (positive quantities, stock checks) on top.

pub mod cart_store;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod service;

pub use cart_store::CartStore;
pub use error::{CartError, Result};
pub use memory::InMemoryCartStore;
pub use redis_store::RedisCartStore;
pub use service::{CartLineView, CartService, CartView};
