//! Requests accepted by the checkout core.

use common::{AddressId, IdempotencyKey, ItemId, UserId};

/// Request to turn selected cart entries into an order.
///
/// Fields are optional because they arrive from an untrusted client; the
/// commit orchestrator rejects incomplete requests before touching inventory.
#[derive(Debug, Clone, Default)]
pub struct CommitRequest {
    /// The authenticated caller, if any.
    pub user_id: Option<UserId>,
    pub address_id: Option<AddressId>,
    /// Payment method code as submitted; validated by the order builder.
    pub pay_method: Option<String>,
    /// Cart items selected for checkout; quantities come from the cart.
    pub item_ids: Vec<ItemId>,
    pub idempotency_key: Option<IdempotencyKey>,
}

impl CommitRequest {
    /// Creates a complete request for an authenticated user.
    pub fn new(
        user_id: UserId,
        address_id: AddressId,
        pay_method: i16,
        item_ids: impl IntoIterator<Item = ItemId>,
    ) -> Self {
        Self {
            user_id: Some(user_id),
            address_id: Some(address_id),
            pay_method: Some(pay_method.to_string()),
            item_ids: item_ids.into_iter().collect(),
            idempotency_key: None,
        }
    }

    /// Attaches an idempotency key.
    pub fn with_idempotency_key(mut self, key: IdempotencyKey) -> Self {
        self.idempotency_key = Some(key);
        self
    }

    /// Returns the selected item ids with duplicates removed, first occurrence wins.
    pub fn distinct_item_ids(&self) -> Vec<ItemId> {
        let mut seen = std::collections::HashSet::new();
        self.item_ids
            .iter()
            .copied()
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// Review text for one line of an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewComment {
    pub item_id: ItemId,
    pub text: String,
}

impl ReviewComment {
    pub fn new(item_id: ItemId, text: impl Into<String>) -> Self {
        Self {
            item_id,
            text: text.into(),
        }
    }
}
