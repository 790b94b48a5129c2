//! Identifiers and value types shared by every crate in the workspace.

mod money;
mod types;

pub use money::Money;
pub use types::{AddressId, IdempotencyKey, ItemId, OrderId, UserId};
