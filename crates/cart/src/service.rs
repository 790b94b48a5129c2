//! Cart operations exposed to the storefront.

use common::{ItemId, Money, UserId};
use serde::Serialize;
use store::Catalog;
use tracing::{instrument, warn};

use crate::error::CartError;
use crate::{CartStore, Result};

/// One cart entry joined with its catalog row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLineView {
    pub item_id: ItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

/// A user's cart priced at current catalog prices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total_count: u32,
    pub total_price: Money,
}

/// Cart operations over a cart store and the catalog.
#[derive(Clone)]
pub struct CartService<C, K> {
    carts: C,
    catalog: K,
}

impl<C: CartStore, K: Catalog> CartService<C, K> {
    pub fn new(carts: C, catalog: K) -> Self {
        Self { carts, catalog }
    }

    /// The underlying cart store.
    pub fn carts(&self) -> &C {
        &self.carts
    }

    /// Adds `quantity` units to the cart, accumulating with any existing entry.
    ///
    /// Returns the number of distinct items in the cart afterwards.
    #[instrument(skip(self))]
    pub async fn add(&self, user_id: UserId, item_id: ItemId, quantity: i64) -> Result<usize> {
        let quantity = positive(quantity)?;
        let existing = self.carts.get(user_id, item_id).await?.unwrap_or(0);
        let total = existing.saturating_add(quantity);
        self.ensure_in_stock(item_id, total).await?;
        self.carts.set(user_id, item_id, total).await?;
        self.carts.count(user_id).await
    }

    /// Replaces the quantity of a cart entry.
    ///
    /// Returns the total quantity across the cart afterwards.
    #[instrument(skip(self))]
    pub async fn update(&self, user_id: UserId, item_id: ItemId, quantity: i64) -> Result<u32> {
        let quantity = positive(quantity)?;
        self.ensure_in_stock(item_id, quantity).await?;
        self.carts.set(user_id, item_id, quantity).await?;
        self.total_quantity(user_id).await
    }

    /// Removes an entry from the cart.
    ///
    /// Returns the total quantity across the cart afterwards.
    #[instrument(skip(self))]
    pub async fn remove(&self, user_id: UserId, item_id: ItemId) -> Result<u32> {
        if self.catalog.get_item(item_id).await?.is_none() {
            return Err(CartError::ItemNotFound(item_id));
        }
        self.carts.delete(user_id, &[item_id]).await?;
        self.total_quantity(user_id).await
    }

    /// Sum of quantities across the user's cart.
    pub async fn total_quantity(&self, user_id: UserId) -> Result<u32> {
        Ok(self
            .carts
            .list_all(user_id)
            .await?
            .values()
            .fold(0u32, |total, quantity| total.saturating_add(*quantity)))
    }

    /// Returns the cart priced at current catalog prices.
    ///
    /// Entries whose item has left the catalog are skipped.
    #[instrument(skip(self))]
    pub async fn view(&self, user_id: UserId) -> Result<CartView> {
        let entries = self.carts.list_all(user_id).await?;
        let mut view = CartView::default();

        for (item_id, quantity) in entries {
            let Some(item) = self.catalog.get_item(item_id).await? else {
                warn!(%user_id, %item_id, "Cart entry references unknown item");
                continue;
            };
            let subtotal = item.price.multiply(quantity);
            view.total_count = view.total_count.saturating_add(quantity);
            view.total_price += subtotal;
            view.lines.push(CartLineView {
                item_id,
                name: item.name,
                unit_price: item.price,
                quantity,
                subtotal,
            });
        }

        Ok(view)
    }

    /// Returns the number of distinct items in the cart.
    pub async fn count(&self, user_id: UserId) -> Result<usize> {
        self.carts.count(user_id).await
    }

    async fn ensure_in_stock(&self, item_id: ItemId, requested: u32) -> Result<()> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or(CartError::ItemNotFound(item_id))?;
        if !item.has_stock_for(requested) {
            return Err(CartError::InsufficientStock {
                item_id,
                requested,
                available: item.stock,
            });
        }
        Ok(())
    }
}

fn positive(quantity: i64) -> Result<u32> {
    u32::try_from(quantity)
        .ok()
        .filter(|q| *q > 0)
        .ok_or(CartError::InvalidQuantity(quantity))
}
