//! Order pricing policy.

use common::Money;

/// Default flat shipping surcharge in minor units.
pub const DEFAULT_SHIPPING_FEE_MINOR: i64 = 1000;

/// Flat shipping fee added on top of the line total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShippingPolicy {
    pub flat_fee: Money,
}

impl ShippingPolicy {
    pub fn flat(fee: Money) -> Self {
        Self { flat_fee: fee }
    }

    /// Fee charged for an order with the given line total.
    pub fn fee_for(&self, _line_total: Money) -> Money {
        self.flat_fee
    }

    /// Line total plus shipping.
    pub fn payable(&self, line_total: Money) -> Money {
        line_total + self.fee_for(line_total)
    }
}

impl Default for ShippingPolicy {
    fn default() -> Self {
        Self::flat(Money::from_minor(DEFAULT_SHIPPING_FEE_MINOR))
    }
}
