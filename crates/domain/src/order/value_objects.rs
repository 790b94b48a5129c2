//! Value objects for the order domain.

use common::{ItemId, Money, OrderId};
use serde::{Deserialize, Serialize};

/// Recognized payment methods, keyed by their wire code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayMethod {
    CashOnDelivery,
    WechatPay,
    /// Settled through the external payment gateway.
    GatewayPay,
    UnionPay,
}

impl PayMethod {
    /// Looks up a payment method by its wire code.
    pub fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(PayMethod::CashOnDelivery),
            2 => Some(PayMethod::WechatPay),
            3 => Some(PayMethod::GatewayPay),
            4 => Some(PayMethod::UnionPay),
            _ => None,
        }
    }

    pub fn code(&self) -> i16 {
        match self {
            PayMethod::CashOnDelivery => 1,
            PayMethod::WechatPay => 2,
            PayMethod::GatewayPay => 3,
            PayMethod::UnionPay => 4,
        }
    }

    /// Returns true if payment for this method is confirmed by polling the gateway.
    pub fn is_gateway_integrated(&self) -> bool {
        matches!(self, PayMethod::GatewayPay)
    }
}

/// A single (item, quantity) pair within an order.
///
/// The unit price is a snapshot taken at reservation time and stays
/// authoritative for the order even if the catalog price later changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineItem {
    pub order_id: OrderId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
    /// Set once, after delivery, by the review handler.
    pub comment: Option<String>,
}

impl OrderLineItem {
    pub fn new(order_id: OrderId, item_id: ItemId, quantity: u32, unit_price: Money) -> Self {
        Self {
            order_id,
            item_id,
            quantity,
            unit_price,
            comment: None,
        }
    }

    /// Returns quantity * unit price.
    pub fn subtotal(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}
