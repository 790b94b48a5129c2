//! Catalog rows the checkout core reads.

use common::{AddressId, ItemId, Money, UserId};
use serde::{Deserialize, Serialize};

/// Stock and sales counters for a sellable item.
///
/// `stock` never goes below zero and `sales` never decreases. Both are only
/// mutated through the inventory ledger's compare-and-swap reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    /// Current unit price.
    pub price: Money,
    pub stock: u32,
    pub sales: u32,
}

impl InventoryItem {
    pub fn new(id: ItemId, name: impl Into<String>, price: Money, stock: u32) -> Self {
        Self {
            id,
            name: name.into(),
            price,
            stock,
            sales: 0,
        }
    }

    /// Returns true if `quantity` units can be taken from the observed stock.
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        quantity <= self.stock
    }
}

/// A shipping address owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub receiver: String,
    pub detail: String,
    pub phone: String,
}

impl Address {
    pub fn belongs_to(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }
}
