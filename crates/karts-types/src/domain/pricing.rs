use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Fees and tax applied on top of the cart subtotal at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PricingPolicy {
    pub delivery_fee: Decimal,
    pub service_fee: Decimal,
    /// Fraction of the subtotal, e.g. `0.08` for 8%.
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            delivery_fee: Decimal::new(299, 2),
            service_fee: Decimal::new(199, 2),
            tax_rate: Decimal::new(8, 2),
        }
    }
}

/// A promotion code and the flat amount it takes off the subtotal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Coupon {
    pub code: String,
    pub discount: Decimal,
}

/// Itemised amounts for one checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderCharges {
    pub subtotal: Decimal,
    /// Never larger than `subtotal`.
    #[serde(default)]
    pub discount: Decimal,
    pub delivery_fee: Decimal,
    pub service_fee: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl PricingPolicy {
    /// No fees, no tax. Order total equals the subtotal.
    pub fn free() -> Self {
        Self {
            delivery_fee: Decimal::ZERO,
            service_fee: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
        }
    }

    /// Charges for `subtotal`, saturating at `Decimal::MAX` instead of
    /// overflowing. Use [`PricingPolicy::checked_quote`] when an overflow
    /// must be reported.
    pub fn quote(&self, subtotal: Decimal, discount: Decimal) -> OrderCharges {
        if let Some(charges) = self.checked_quote(subtotal, discount) {
            return charges;
        }
        let discount = clamp_discount(subtotal, discount);
        let tax = round_cents(subtotal.saturating_mul(self.tax_rate));
        OrderCharges {
            subtotal,
            discount,
            delivery_fee: self.delivery_fee,
            service_fee: self.service_fee,
            tax,
            total: (subtotal - discount)
                .saturating_add(self.delivery_fee)
                .saturating_add(self.service_fee)
                .saturating_add(tax),
        }
    }

    /// Tax is taken on the subtotal before the discount.
    pub fn checked_quote(&self, subtotal: Decimal, discount: Decimal) -> Option<OrderCharges> {
        let discount = clamp_discount(subtotal, discount);
        let tax = round_cents(subtotal.checked_mul(self.tax_rate)?);
        let total = (subtotal - discount)
            .checked_add(self.delivery_fee)?
            .checked_add(self.service_fee)?
            .checked_add(tax)?;
        Some(OrderCharges {
            subtotal,
            discount,
            delivery_fee: self.delivery_fee,
            service_fee: self.service_fee,
            tax,
            total,
        })
    }
}

fn clamp_discount(subtotal: Decimal, discount: Decimal) -> Decimal {
    discount.min(subtotal).max(Decimal::ZERO)
}

fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}
