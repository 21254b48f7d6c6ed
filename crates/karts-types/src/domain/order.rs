use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::{checked_subtotal, CartError, CartLineItem};
use super::pricing::{Coupon, OrderCharges, PricingPolicy};

/// Minutes between placement and the estimated delivery time.
pub const DELIVERY_ESTIMATE_MINUTES: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    ReadyForPickup,
    PickedUp,
    Delivered,
    Cancelled,
    Refunded,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestaurantRef {
    pub id: String,
    pub name: String,
}

/// A placed order. Lines are a copy of the cart at purchase time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Order {
    pub id: String,
    pub restaurant: RestaurantRef,
    pub lines: Vec<CartLineItem>,
    pub charges: OrderCharges,
    pub total: Decimal,
    pub status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coupon_code: Option<String>,
    pub placed_at: DateTime<Utc>,
    pub estimated_delivery_at: DateTime<Utc>,
}

/// Everything checkout needs besides the cart itself. Ids and timestamps are
/// supplied by the caller so that applying the request stays deterministic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub order_id: String,
    pub restaurant: RestaurantRef,
    pub pricing: PricingPolicy,
    pub placed_at: DateTime<Utc>,
}

impl Order {
    pub fn place(
        id: String,
        restaurant: RestaurantRef,
        lines: Vec<CartLineItem>,
        pricing: &PricingPolicy,
        coupon: Option<&Coupon>,
        placed_at: DateTime<Utc>,
    ) -> Result<Self, CartError> {
        if id.trim().is_empty() {
            return Err(CartError::EmptyOrderId);
        }
        if lines.is_empty() {
            return Err(CartError::EmptyCart);
        }
        for line in &lines {
            line.validate()?;
        }
        let subtotal = checked_subtotal(&lines).ok_or(CartError::AmountOverflow)?;
        let discount = coupon.map_or(Decimal::ZERO, |c| c.discount);
        let charges = pricing
            .checked_quote(subtotal, discount)
            .ok_or(CartError::AmountOverflow)?;
        Ok(Self {
            id,
            restaurant,
            lines,
            total: charges.total,
            charges,
            status: OrderStatus::Preparing,
            delivery_address: None,
            coupon_code: coupon.map(|c| c.code.clone()),
            placed_at,
            estimated_delivery_at: placed_at + Duration::minutes(DELIVERY_ESTIMATE_MINUTES),
        })
    }

    pub fn with_delivery_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.delivery_address = if address.trim().is_empty() {
            None
        } else {
            Some(address)
        };
        self
    }

    pub fn item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }
}
