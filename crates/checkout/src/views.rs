//! View models returned to the presentation layer.
//!
//! Computed display fields live here instead of on the domain rows.

use chrono::{DateTime, Utc};
use common::{AddressId, ItemId, Money, OrderId};
use domain::{InventoryItem, Order, OrderLineItem, OrderStatus, PayMethod};
use serde::Serialize;

/// One line on the checkout page, priced at the current catalog price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewLine {
    pub item_id: ItemId,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub subtotal: Money,
}

/// Checkout page totals. Nothing is reserved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckoutPreview {
    pub lines: Vec<PreviewLine>,
    pub total_count: u32,
    pub total_price: Money,
    pub shipping_fee: Money,
    pub payable: Money,
}

impl CheckoutPreview {
    pub(crate) fn push(&mut self, item: InventoryItem, quantity: u32) {
        let subtotal = item.price.multiply(quantity);
        self.total_count += quantity;
        self.total_price += subtotal;
        self.lines.push(PreviewLine {
            item_id: item.id,
            name: item.name,
            unit_price: item.price,
            quantity,
            subtotal,
        });
    }
}

/// An order line with its snapshot subtotal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLineView {
    pub item_id: ItemId,
    pub quantity: u32,
    pub unit_price: Money,
    pub subtotal: Money,
    pub comment: Option<String>,
}

impl From<&OrderLineItem> for OrderLineView {
    fn from(line: &OrderLineItem) -> Self {
        Self {
            item_id: line.item_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            subtotal: line.subtotal(),
            comment: line.comment.clone(),
        }
    }
}

/// Order header plus lines, as shown on the order page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderDetail {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub pay_method: PayMethod,
    pub address_id: AddressId,
    pub total_count: u32,
    pub total_price: Money,
    pub shipping_fee: Money,
    pub payable: Money,
    pub gateway_trade_no: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<OrderLineView>,
}

impl OrderDetail {
    pub fn new(order: &Order, lines: &[OrderLineItem]) -> Self {
        Self {
            order_id: order.order_id,
            status: order.status,
            pay_method: order.pay_method,
            address_id: order.address_id,
            total_count: order.total_count,
            total_price: order.total_price,
            shipping_fee: order.shipping_fee,
            payable: order.payable_total(),
            gateway_trade_no: order.gateway_trade_no.clone(),
            created_at: order.created_at,
            lines: lines.iter().map(OrderLineView::from).collect(),
        }
    }
}
