//! Key-value cart store contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ItemId, UserId};

use crate::Result;

/// Per-user mapping of item to quantity.
///
/// Implementations must make single-field get/set/delete atomic; uniqueness
/// per (user, item) is the only invariant.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the quantity of `item_id` in the user's cart.
    async fn get(&self, user_id: UserId, item_id: ItemId) -> Result<Option<u32>>;

    /// Sets the quantity of `item_id`, replacing any previous value.
    async fn set(&self, user_id: UserId, item_id: ItemId, quantity: u32) -> Result<()>;

    /// Removes the given items. Missing items are ignored.
    async fn delete(&self, user_id: UserId, item_ids: &[ItemId]) -> Result<()>;

    /// Returns every entry of the user's cart.
    async fn list_all(&self, user_id: UserId) -> Result<BTreeMap<ItemId, u32>>;

    /// Returns the number of distinct items in the user's cart.
    async fn count(&self, user_id: UserId) -> Result<usize>;
}

#[async_trait]
impl<T: CartStore + ?Sized> CartStore for Arc<T> {
    async fn get(&self, user_id: UserId, item_id: ItemId) -> Result<Option<u32>> {
        (**self).get(user_id, item_id).await
    }

    async fn set(&self, user_id: UserId, item_id: ItemId, quantity: u32) -> Result<()> {
        (**self).set(user_id, item_id, quantity).await
    }

    async fn delete(&self, user_id: UserId, item_ids: &[ItemId]) -> Result<()> {
        (**self).delete(user_id, item_ids).await
    }

    async fn list_all(&self, user_id: UserId) -> Result<BTreeMap<ItemId, u32>> {
        (**self).list_all(user_id).await
    }

    async fn count(&self, user_id: UserId) -> Result<usize> {
        (**self).count(user_id).await
    }
}
