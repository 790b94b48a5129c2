//! Relational store contract for the checkout core.
//!
//! The store must offer transactions and a conditional row update whose
//! predicate includes a previously read value. Two implementations are
//! provided: [`InMemoryStore`] for tests and single-process deployments,
//! and [`PostgresStore`] backed by `sqlx`.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryStore, InMemoryTransaction};
pub use postgres::{PostgresStore, PostgresTransaction};
pub use store::{Catalog, OrderStore, StoreTransaction};
