//! In-memory cart store.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use common::{ItemId, UserId};

use crate::error::CartError;
use crate::{CartStore, Result};

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, BTreeMap<ItemId, u32>>,
    fail_on_delete: bool,
}

/// In-memory cart store for testing and single-process deployments.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartStore {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartStore {
    /// Creates a new empty cart store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures delete calls to fail.
    pub fn set_fail_on_delete(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_delete = fail;
    }
}

#[async_trait]
impl CartStore for InMemoryCartStore {
    async fn get(&self, user_id: UserId, item_id: ItemId) -> Result<Option<u32>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state
            .carts
            .get(&user_id)
            .and_then(|cart| cart.get(&item_id))
            .copied())
    }

    async fn set(&self, user_id: UserId, item_id: ItemId, quantity: u32) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .carts
            .entry(user_id)
            .or_default()
            .insert(item_id, quantity);
        Ok(())
    }

    async fn delete(&self, user_id: UserId, item_ids: &[ItemId]) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_delete {
            return Err(CartError::Unavailable("cart delete rejected".to_string()));
        }
        if let Some(cart) = state.carts.get_mut(&user_id) {
            for item_id in item_ids {
                cart.remove(item_id);
            }
        }
        Ok(())
    }

    async fn list_all(&self, user_id: UserId) -> Result<BTreeMap<ItemId, u32>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn count(&self, user_id: UserId) -> Result<usize> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        Ok(state.carts.get(&user_id).map_or(0, BTreeMap::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_and_count() {
        let carts = InMemoryCartStore::new();
        let user = UserId::new(1);

        carts.set(user, ItemId::new(10), 2).await.unwrap();
        carts.set(user, ItemId::new(11), 1).await.unwrap();
        carts.set(user, ItemId::new(10), 5).await.unwrap();

        assert_eq!(carts.get(user, ItemId::new(10)).await.unwrap(), Some(5));
        assert_eq!(carts.count(user).await.unwrap(), 2);
        assert_eq!(carts.count(UserId::new(2)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_delete_ignores_missing_items() {
        let carts = InMemoryCartStore::new();
        let user = UserId::new(1);
        carts.set(user, ItemId::new(10), 2).await.unwrap();

        carts
            .delete(user, &[ItemId::new(10), ItemId::new(99)])
            .await
            .unwrap();

        assert!(carts.list_all(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fail_on_delete_keeps_entries() {
        let carts = InMemoryCartStore::new();
        let user = UserId::new(1);
        carts.set(user, ItemId::new(10), 2).await.unwrap();
        carts.set_fail_on_delete(true);

        assert!(carts.delete(user, &[ItemId::new(10)]).await.is_err());
        assert_eq!(carts.get(user, ItemId::new(10)).await.unwrap(), Some(2));
    }
}
