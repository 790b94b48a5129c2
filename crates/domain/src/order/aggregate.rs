//! Order aggregate: the header row plus its totals.

use chrono::{DateTime, Utc};
use common::{AddressId, IdempotencyKey, Money, OrderId, UserId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderLineItem, OrderStatus, PayMethod};

/// Order header.
///
/// Created once per successful commit in `Unpaid` and never deleted; its
/// status only moves forward along [`OrderStatus`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub pay_method: PayMethod,
    pub total_count: u32,
    /// Sum of line subtotals, excluding shipping.
    pub total_price: Money,
    pub shipping_fee: Money,
    pub status: OrderStatus,
    pub gateway_trade_no: Option<String>,
    pub idempotency_key: Option<IdempotencyKey>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Creates an unpaid order header from accumulated line totals.
    pub fn unpaid(
        order_id: OrderId,
        user_id: UserId,
        address_id: AddressId,
        pay_method: PayMethod,
        totals: OrderTotals,
        shipping_fee: Money,
        idempotency_key: Option<IdempotencyKey>,
    ) -> Self {
        Self {
            order_id,
            user_id,
            address_id,
            pay_method,
            total_count: totals.item_count,
            total_price: totals.price,
            shipping_fee,
            status: OrderStatus::Unpaid,
            gateway_trade_no: None,
            idempotency_key,
            created_at: Utc::now(),
        }
    }

    /// Amount the buyer pays: line total plus shipping.
    pub fn payable_total(&self) -> Money {
        self.total_price + self.shipping_fee
    }

    pub fn belongs_to(&self, user_id: UserId) -> bool {
        self.user_id == user_id
    }

    /// Checks that `self.status -> next` is a legal forward transition.
    pub fn ensure_transition(&self, next: OrderStatus) -> Result<(), OrderError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(OrderError::InvalidStatusTransition {
                current: self.status,
                requested: next,
            })
        }
    }
}

/// Running item count and price across an order's lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OrderTotals {
    pub item_count: u32,
    pub price: Money,
}

impl OrderTotals {
    pub fn add_line(&mut self, line: &OrderLineItem) {
        self.item_count = self.item_count.saturating_add(line.quantity);
        self.price += line.subtotal();
    }

    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a OrderLineItem>) -> Self {
        let mut totals = Self::default();
        for line in lines {
            totals.add_line(line);
        }
        totals
    }
}
