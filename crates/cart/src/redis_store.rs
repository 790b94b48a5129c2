//! Redis-backed cart store: one hash per user, `cart_<user_id>`.

use std::collections::BTreeMap;

use async_trait::async_trait;
use common::{ItemId, UserId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::{CartStore, Result};

/// Cart store keeping each user's cart in a Redis hash of item id to quantity.
///
/// The connection manager is constructed once at startup and shared; it
/// reconnects on its own after transient failures.
#[derive(Clone)]
pub struct RedisCartStore {
    connection: ConnectionManager,
}

impl RedisCartStore {
    /// Wraps an existing connection manager.
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }

    /// Connects to the Redis server at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self::new(connection))
    }

    fn key(user_id: UserId) -> String {
        format!("cart_{user_id}")
    }
}

#[async_trait]
impl CartStore for RedisCartStore {
    async fn get(&self, user_id: UserId, item_id: ItemId) -> Result<Option<u32>> {
        let mut conn = self.connection.clone();
        let quantity: Option<u32> = conn.hget(Self::key(user_id), item_id.as_i64()).await?;
        Ok(quantity)
    }

    async fn set(&self, user_id: UserId, item_id: ItemId, quantity: u32) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: () = conn
            .hset(Self::key(user_id), item_id.as_i64(), quantity)
            .await?;
        Ok(())
    }

    async fn delete(&self, user_id: UserId, item_ids: &[ItemId]) -> Result<()> {
        if item_ids.is_empty() {
            return Ok(());
        }
        let fields: Vec<i64> = item_ids.iter().map(ItemId::as_i64).collect();
        let mut conn = self.connection.clone();
        let _: () = conn.hdel(Self::key(user_id), fields).await?;
        Ok(())
    }

    async fn list_all(&self, user_id: UserId) -> Result<BTreeMap<ItemId, u32>> {
        let mut conn = self.connection.clone();
        let raw: BTreeMap<i64, u32> = conn.hgetall(Self::key(user_id)).await?;
        Ok(raw
            .into_iter()
            .map(|(item, quantity)| (ItemId::new(item), quantity))
            .collect())
    }

    async fn count(&self, user_id: UserId) -> Result<usize> {
        let mut conn = self.connection.clone();
        let len: usize = conn.hlen(Self::key(user_id)).await?;
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_layout() {
        assert_eq!(RedisCartStore::key(UserId::new(42)), "cart_42");
    }
}
