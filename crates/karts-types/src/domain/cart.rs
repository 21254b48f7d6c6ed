use std::collections::BTreeSet;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::order::{CheckoutRequest, Order};
use super::pricing::{Coupon, OrderCharges, PricingPolicy};
use super::profile::{Profile, ProfilePatch};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CartError {
    #[error("line id must not be empty")]
    EmptyLineId,
    #[error("quantity for line {id} must be at least 1, got {quantity}")]
    InvalidQuantity { id: String, quantity: u32 },
    #[error("unit price for line {id} must not be negative, got {price}")]
    NegativePrice { id: String, price: Decimal },
    #[error("quantity for line {id} overflows")]
    QuantityOverflow { id: String },
    #[error("cart amount overflows")]
    AmountOverflow,
    #[error("line {id} appears more than once")]
    DuplicateLine { id: String },
    #[error("coupon code must not be empty")]
    EmptyCouponCode,
    #[error("coupon discount must not be negative, got {discount}")]
    NegativeDiscount { discount: Decimal },
    #[error("restaurant id must not be empty")]
    EmptyRestaurantId,
    #[error("order id must not be empty")]
    EmptyOrderId,
    #[error("cart is empty")]
    EmptyCart,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FoodItemRef {
    pub id: String,
    pub restaurant_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VariantRef {
    pub id: String,
    pub name: String,
}

/// One cart row. `id` identifies the food item plus its selected variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CartLineItem {
    pub id: String,
    pub food_item: FoodItemRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<VariantRef>,
    pub quantity: u32,
    pub unit_price: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special_instructions: Option<String>,
}

impl CartLineItem {
    pub fn new(food_item: FoodItemRef, quantity: u32, unit_price: Decimal) -> Self {
        Self {
            id: Self::line_id(&food_item.id, None),
            food_item,
            variant: None,
            quantity,
            unit_price,
            special_instructions: None,
        }
    }

    /// Stable line id: `"<food>"`, or `"<food>::<variant>"` when a variant is selected.
    pub fn line_id(food_id: &str, variant_id: Option<&str>) -> String {
        match variant_id {
            Some(v) => format!("{food_id}::{v}"),
            None => food_id.to_string(),
        }
    }

    pub fn with_variant(mut self, variant: VariantRef) -> Self {
        self.id = Self::line_id(&self.food_item.id, Some(&variant.id));
        self.variant = Some(variant);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.special_instructions = Some(instructions.into());
        self
    }

    /// Saturates at `Decimal::MAX`. Lines held by a [`CartState`] never do.
    pub fn line_total(&self) -> Decimal {
        self.checked_line_total().unwrap_or(Decimal::MAX)
    }

    pub fn checked_line_total(&self) -> Option<Decimal> {
        self.unit_price.checked_mul(Decimal::from(self.quantity))
    }

    pub fn validate(&self) -> Result<(), CartError> {
        if self.id.trim().is_empty() {
            return Err(CartError::EmptyLineId);
        }
        if self.quantity == 0 {
            return Err(CartError::InvalidQuantity {
                id: self.id.clone(),
                quantity: self.quantity,
            });
        }
        if self.unit_price < Decimal::ZERO {
            return Err(CartError::NegativePrice {
                id: self.id.clone(),
                price: self.unit_price,
            });
        }
        Ok(())
    }
}

/// Sum of line totals, or `None` if it does not fit in a `Decimal`.
pub fn checked_subtotal(lines: &[CartLineItem]) -> Option<Decimal> {
    lines
        .iter()
        .try_fold(Decimal::ZERO, |acc, l| acc.checked_add(l.checked_line_total()?))
}

fn validate_coupon(code: &str, discount: Decimal) -> Result<(), CartError> {
    if code.trim().is_empty() {
        return Err(CartError::EmptyCouponCode);
    }
    if discount < Decimal::ZERO {
        return Err(CartError::NegativeDiscount { discount });
    }
    Ok(())
}

/// Commands accepted by [`CartState::apply`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum CartCommand {
    AddToCart(CartLineItem),
    RemoveFromCart { id: String },
    /// `quantity <= 0` removes the line.
    UpdateQuantity { id: String, quantity: i64 },
    ClearCart,
    AddFavorite { restaurant_id: String },
    RemoveFavorite { restaurant_id: String },
    RecordOrder(Order),
    UpdateProfile(ProfilePatch),
    /// Replaces any coupon already applied.
    ApplyCoupon { code: String, discount: Decimal },
    RemoveCoupon,
    /// Records an order built from the current lines and empties the cart in one step.
    Checkout(CheckoutRequest),
}

impl CartCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AddToCart(_) => "add_to_cart",
            Self::RemoveFromCart { .. } => "remove_from_cart",
            Self::UpdateQuantity { .. } => "update_quantity",
            Self::ClearCart => "clear_cart",
            Self::AddFavorite { .. } => "add_favorite",
            Self::RemoveFavorite { .. } => "remove_favorite",
            Self::RecordOrder(_) => "record_order",
            Self::UpdateProfile(_) => "update_profile",
            Self::ApplyCoupon { .. } => "apply_coupon",
            Self::RemoveCoupon => "remove_coupon",
            Self::Checkout(_) => "checkout",
        }
    }
}

/// Which parts of a snapshot differ from an earlier one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CartChanges {
    pub lines: bool,
    pub orders: bool,
    pub favorites: bool,
    pub profile: bool,
    pub coupon: bool,
}

impl CartChanges {
    pub fn any(&self) -> bool {
        self.lines || self.orders || self.favorites || self.profile || self.coupon
    }
}

/// Immutable cart snapshot.
///
/// Every field sits behind an `Arc`. Applying a command clones only the
/// fields it changes, so untouched fields stay pointer-equal across
/// snapshots and a no-op command returns a snapshot equal in every field.
///
/// Deserializing checks the same invariants `apply` maintains, so a stored
/// snapshot with zero quantities or repeated line ids is rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(try_from = "StoredCart")]
pub struct CartState {
    lines: Arc<Vec<CartLineItem>>,
    orders: Arc<Vec<Order>>,
    favorite_ids: Arc<BTreeSet<String>>,
    profile: Arc<Profile>,
    coupon: Arc<Option<Coupon>>,
}

#[derive(Deserialize)]
struct StoredCart {
    lines: Vec<CartLineItem>,
    orders: Vec<Order>,
    favorite_ids: BTreeSet<String>,
    profile: Profile,
    #[serde(default)]
    coupon: Option<Coupon>,
}

impl TryFrom<StoredCart> for CartState {
    type Error = CartError;

    fn try_from(stored: StoredCart) -> Result<Self, Self::Error> {
        check_lines(&stored.lines)?;
        if stored.favorite_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(CartError::EmptyRestaurantId);
        }
        if let Some(coupon) = &stored.coupon {
            validate_coupon(&coupon.code, coupon.discount)?;
        }
        Ok(Self {
            lines: Arc::new(stored.lines),
            orders: Arc::new(stored.orders),
            favorite_ids: Arc::new(stored.favorite_ids),
            profile: Arc::new(stored.profile),
            coupon: Arc::new(stored.coupon),
        })
    }
}

fn check_lines(lines: &[CartLineItem]) -> Result<(), CartError> {
    let mut seen = BTreeSet::new();
    for line in lines {
        line.validate()?;
        if !seen.insert(line.id.as_str()) {
            return Err(CartError::DuplicateLine {
                id: line.id.clone(),
            });
        }
    }
    checked_subtotal(lines).ok_or(CartError::AmountOverflow)?;
    Ok(())
}

impl CartState {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile: Arc::new(profile),
            ..Self::default()
        }
    }

    pub fn lines(&self) -> &[CartLineItem] {
        &self.lines
    }

    pub fn line(&self, id: &str) -> Option<&CartLineItem> {
        self.lines.iter().find(|l| l.id == id)
    }

    /// Most recent first.
    pub fn orders(&self) -> &[Order] {
        &self.orders
    }

    pub fn recent_orders(&self, limit: usize) -> &[Order] {
        &self.orders[..limit.min(self.orders.len())]
    }

    pub fn favorite_ids(&self) -> &BTreeSet<String> {
        &self.favorite_ids
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn coupon(&self) -> Option<&Coupon> {
        (*self.coupon).as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Subtotal before fees and discount.
    pub fn cart_total(&self) -> Decimal {
        checked_subtotal(&self.lines).unwrap_or(Decimal::MAX)
    }

    pub fn cart_item_count(&self) -> u64 {
        self.lines.iter().map(|l| u64::from(l.quantity)).sum()
    }

    pub fn is_favorite(&self, restaurant_id: &str) -> bool {
        self.favorite_ids.contains(restaurant_id)
    }

    pub fn quote(&self, pricing: &PricingPolicy) -> OrderCharges {
        let discount = self.coupon().map_or(Decimal::ZERO, |c| c.discount);
        pricing.quote(self.cart_total(), discount)
    }

    pub fn changes_since(&self, previous: &CartState) -> CartChanges {
        CartChanges {
            lines: !Arc::ptr_eq(&self.lines, &previous.lines),
            orders: !Arc::ptr_eq(&self.orders, &previous.orders),
            favorites: !Arc::ptr_eq(&self.favorite_ids, &previous.favorite_ids),
            profile: !Arc::ptr_eq(&self.profile, &previous.profile),
            coupon: !Arc::ptr_eq(&self.coupon, &previous.coupon),
        }
    }

    /// Compute the next snapshot. Rejected commands leave `self` untouched.
    pub fn apply(&self, command: CartCommand) -> Result<CartState, CartError> {
        match command {
            CartCommand::AddToCart(line) => self.add_line(line),
            CartCommand::RemoveFromCart { id } => Ok(self.remove_line(&id)),
            CartCommand::UpdateQuantity { id, quantity } => self.set_quantity(&id, quantity),
            CartCommand::ClearCart => Ok(self.cleared()),
            CartCommand::AddFavorite { restaurant_id } => self.add_favorite(restaurant_id),
            CartCommand::RemoveFavorite { restaurant_id } => Ok(self.remove_favorite(&restaurant_id)),
            CartCommand::RecordOrder(order) => Ok(self.record_order(order)),
            CartCommand::UpdateProfile(patch) => Ok(self.update_profile(&patch)),
            CartCommand::ApplyCoupon { code, discount } => self.apply_coupon(code, discount),
            CartCommand::RemoveCoupon => Ok(self.remove_coupon()),
            CartCommand::Checkout(request) => self.checkout(request),
        }
    }

    fn add_line(&self, line: CartLineItem) -> Result<CartState, CartError> {
        line.validate()?;
        let mut lines = Vec::clone(&self.lines);
        match lines.iter_mut().find(|l| l.id == line.id) {
            Some(existing) => {
                existing.quantity = existing
                    .quantity
                    .checked_add(line.quantity)
                    .ok_or_else(|| CartError::QuantityOverflow {
                        id: line.id.clone(),
                    })?;
            }
            None => lines.push(line),
        }
        checked_subtotal(&lines).ok_or(CartError::AmountOverflow)?;
        Ok(Self {
            lines: Arc::new(lines),
            ..self.clone()
        })
    }

    fn remove_line(&self, id: &str) -> CartState {
        if self.line(id).is_none() {
            return self.clone();
        }
        let lines = self.lines.iter().filter(|l| l.id != id).cloned().collect();
        Self {
            lines: Arc::new(lines),
            ..self.clone()
        }
    }

    fn set_quantity(&self, id: &str, quantity: i64) -> Result<CartState, CartError> {
        if quantity <= 0 {
            return Ok(self.remove_line(id));
        }
        let Some(pos) = self.lines.iter().position(|l| l.id == id) else {
            return Ok(self.clone());
        };
        let quantity =
            u32::try_from(quantity).map_err(|_| CartError::QuantityOverflow { id: id.to_string() })?;
        if self.lines[pos].quantity == quantity {
            return Ok(self.clone());
        }
        let mut lines = Vec::clone(&self.lines);
        lines[pos].quantity = quantity;
        checked_subtotal(&lines).ok_or(CartError::AmountOverflow)?;
        Ok(Self {
            lines: Arc::new(lines),
            ..self.clone()
        })
    }

    /// Empties the lines. A coupon goes with them.
    fn cleared(&self) -> CartState {
        let mut next = self.clone();
        if !self.lines.is_empty() {
            next.lines = Arc::default();
        }
        if self.coupon.is_some() {
            next.coupon = Arc::default();
        }
        next
    }

    fn apply_coupon(&self, code: String, discount: Decimal) -> Result<CartState, CartError> {
        validate_coupon(&code, discount)?;
        let coupon = Coupon { code, discount };
        if self.coupon() == Some(&coupon) {
            return Ok(self.clone());
        }
        Ok(Self {
            coupon: Arc::new(Some(coupon)),
            ..self.clone()
        })
    }

    fn remove_coupon(&self) -> CartState {
        if self.coupon.is_none() {
            return self.clone();
        }
        Self {
            coupon: Arc::default(),
            ..self.clone()
        }
    }

    fn add_favorite(&self, restaurant_id: String) -> Result<CartState, CartError> {
        if restaurant_id.trim().is_empty() {
            return Err(CartError::EmptyRestaurantId);
        }
        if self.is_favorite(&restaurant_id) {
            return Ok(self.clone());
        }
        let mut favorite_ids = BTreeSet::clone(&self.favorite_ids);
        favorite_ids.insert(restaurant_id);
        Ok(Self {
            favorite_ids: Arc::new(favorite_ids),
            ..self.clone()
        })
    }

    fn remove_favorite(&self, restaurant_id: &str) -> CartState {
        if !self.is_favorite(restaurant_id) {
            return self.clone();
        }
        let mut favorite_ids = BTreeSet::clone(&self.favorite_ids);
        favorite_ids.remove(restaurant_id);
        Self {
            favorite_ids: Arc::new(favorite_ids),
            ..self.clone()
        }
    }

    fn prepend_order(&self, order: Order) -> Arc<Vec<Order>> {
        let mut orders = Vec::with_capacity(self.orders.len() + 1);
        orders.push(order);
        orders.extend(self.orders.iter().cloned());
        Arc::new(orders)
    }

    fn record_order(&self, order: Order) -> CartState {
        Self {
            orders: self.prepend_order(order),
            ..self.clone()
        }
    }

    fn update_profile(&self, patch: &ProfilePatch) -> CartState {
        let profile = self.profile.merged(patch);
        if profile == *self.profile {
            return self.clone();
        }
        Self {
            profile: Arc::new(profile),
            ..self.clone()
        }
    }

    fn checkout(&self, request: CheckoutRequest) -> Result<CartState, CartError> {
        let order = Order::place(
            request.order_id,
            request.restaurant,
            Vec::clone(&self.lines),
            &request.pricing,
            self.coupon(),
            request.placed_at,
        )?
        .with_delivery_address(self.profile.address.clone());
        Ok(Self {
            orders: self.prepend_order(order),
            ..self.cleared()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::RestaurantRef;
    use chrono::Utc;

    fn food(id: &str) -> FoodItemRef {
        FoodItemRef {
            id: id.into(),
            restaurant_id: "r1".into(),
            name: id.to_uppercase(),
        }
    }

    fn line(id: &str, qty: u32, cents: i64) -> CartLineItem {
        CartLineItem::new(food(id), qty, Decimal::new(cents, 2))
    }

    fn add(state: &CartState, l: CartLineItem) -> CartState {
        state.apply(CartCommand::AddToCart(l)).unwrap()
    }

    fn order(id: &str) -> Order {
        Order::place(
            id.into(),
            RestaurantRef {
                id: "r1".into(),
                name: "Pizza Palace".into(),
            },
            vec![line("x", 1, 100)],
            &PricingPolicy::free(),
            None,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn merge_on_add_sums_quantities() {
        let s = add(&CartState::default(), line("pizza-1", 1, 1250));
        let s = add(&s, line("pizza-1", 2, 1250));
        assert_eq!(s.lines().len(), 1);
        assert_eq!(s.lines()[0].quantity, 3);
        assert_eq!(s.cart_total(), Decimal::new(3750, 2));
        assert_eq!(s.cart_item_count(), 3);
    }

    #[test]
    fn repeated_adds_keep_single_line() {
        let mut s = CartState::default();
        let qtys = [1u32, 4, 2, 7, 1];
        for q in qtys {
            s = add(&s, line("soup", q, 300));
        }
        let matching: Vec<_> = s.lines().iter().filter(|l| l.id == "soup").collect();
        assert_eq!(matching.len(), 1);
        assert_eq!(matching[0].quantity, qtys.iter().sum::<u32>());
    }

    #[test]
    fn new_lines_append_in_insertion_order() {
        let s = add(&CartState::default(), line("a", 1, 100));
        let s = add(&s, line("b", 1, 100));
        let s = add(&s, line("a", 1, 100));
        let ids: Vec<_> = s.lines().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[test]
    fn variants_are_separate_lines() {
        let plain = line("burger", 1, 800);
        let large = line("burger", 1, 950).with_variant(VariantRef {
            id: "large".into(),
            name: "Large".into(),
        });
        assert_eq!(large.id, "burger::large");
        let s = add(&add(&CartState::default(), plain), large);
        assert_eq!(s.lines().len(), 2);
        assert_eq!(s.cart_total(), Decimal::new(1750, 2));
    }

    #[test]
    fn invalid_add_is_rejected_without_change() {
        let s = add(&CartState::default(), line("a", 1, 100));

        let zero = s.apply(CartCommand::AddToCart(line("a", 0, 100)));
        assert!(matches!(zero, Err(CartError::InvalidQuantity { .. })));

        let negative = s.apply(CartCommand::AddToCart(line("b", 1, -5)));
        assert!(matches!(negative, Err(CartError::NegativePrice { .. })));

        let mut blank = line("c", 1, 100);
        blank.id = String::new();
        assert_eq!(s.apply(CartCommand::AddToCart(blank)), Err(CartError::EmptyLineId));

        assert_eq!(s.lines().len(), 1);
        assert_eq!(s.lines()[0].quantity, 1);
    }

    #[test]
    fn merge_overflow_is_rejected() {
        let s = add(&CartState::default(), line("a", u32::MAX, 1));
        let res = s.apply(CartCommand::AddToCart(line("a", 1, 1)));
        assert!(matches!(res, Err(CartError::QuantityOverflow { .. })));
    }

    #[test]
    fn zero_price_is_allowed() {
        let s = add(&CartState::default(), line("free-dip", 2, 0));
        assert_eq!(s.cart_total(), Decimal::ZERO);
        assert_eq!(s.cart_item_count(), 2);
    }

    #[test]
    fn update_quantity_non_positive_equals_remove() {
        let s = add(&add(&CartState::default(), line("a", 2, 100)), line("b", 1, 100));
        let removed = s
            .apply(CartCommand::RemoveFromCart { id: "a".into() })
            .unwrap();
        for q in [0, -1, -40] {
            let updated = s
                .apply(CartCommand::UpdateQuantity {
                    id: "a".into(),
                    quantity: q,
                })
                .unwrap();
            assert_eq!(updated, removed);
        }
    }

    #[test]
    fn update_quantity_replaces_in_place() {
        let s = add(&add(&CartState::default(), line("a", 2, 100)), line("b", 1, 100));
        let s = s
            .apply(CartCommand::UpdateQuantity {
                id: "a".into(),
                quantity: 5,
            })
            .unwrap();
        assert_eq!(s.lines()[0].id, "a");
        assert_eq!(s.lines()[0].quantity, 5);
        assert_eq!(s.cart_item_count(), 6);
        assert_eq!(s.cart_total(), Decimal::new(600, 2));
    }

    #[test]
    fn update_quantity_on_absent_id_is_noop() {
        let s = add(&CartState::default(), line("a", 2, 100));
        let next = s
            .apply(CartCommand::UpdateQuantity {
                id: "zzz".into(),
                quantity: 9,
            })
            .unwrap();
        assert_eq!(next.lines(), s.lines());
        assert!(!next.changes_since(&s).any());
    }

    #[test]
    fn remove_absent_is_noop() {
        let s = add(&CartState::default(), line("a", 1, 100));
        let next = s
            .apply(CartCommand::RemoveFromCart { id: "nope".into() })
            .unwrap();
        assert_eq!(next, s);
        assert!(!next.changes_since(&s).any());
    }

    #[test]
    fn clear_cart_only_touches_lines() {
        let s = add(&CartState::default(), line("a", 1, 100));
        let s = s
            .apply(CartCommand::AddFavorite {
                restaurant_id: "r1".into(),
            })
            .unwrap();
        let s = s.apply(CartCommand::RecordOrder(order("o1"))).unwrap();
        let cleared = s.apply(CartCommand::ClearCart).unwrap();
        assert!(cleared.is_empty());
        assert_eq!(cleared.cart_total(), Decimal::ZERO);
        assert_eq!(cleared.orders().len(), 1);
        assert!(cleared.is_favorite("r1"));
        assert_eq!(
            cleared.changes_since(&s),
            CartChanges {
                lines: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn favorites_are_idempotent() {
        let add_r1 = CartCommand::AddFavorite {
            restaurant_id: "r1".into(),
        };
        let once = CartState::default().apply(add_r1.clone()).unwrap();
        let twice = once.apply(add_r1).unwrap();
        assert_eq!(once.favorite_ids(), twice.favorite_ids());
        assert!(twice.is_favorite("r1"));

        let removed = twice
            .apply(CartCommand::RemoveFavorite {
                restaurant_id: "r1".into(),
            })
            .unwrap();
        assert!(removed.favorite_ids().is_empty());

        let again = removed
            .apply(CartCommand::RemoveFavorite {
                restaurant_id: "r1".into(),
            })
            .unwrap();
        assert_eq!(again, removed);
    }

    #[test]
    fn blank_favorite_is_rejected() {
        let res = CartState::default().apply(CartCommand::AddFavorite {
            restaurant_id: "".into(),
        });
        assert_eq!(res, Err(CartError::EmptyRestaurantId));
    }

    #[test]
    fn record_order_prepends() {
        let s = CartState::default()
            .apply(CartCommand::RecordOrder(order("o1")))
            .unwrap()
            .apply(CartCommand::RecordOrder(order("o2")))
            .unwrap()
            .apply(CartCommand::RecordOrder(order("o3")))
            .unwrap();
        let ids: Vec<_> = s.orders().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["o3", "o2", "o1"]);
        assert_eq!(s.recent_orders(2).len(), 2);
        assert_eq!(s.recent_orders(2)[0].id, "o3");
        assert_eq!(s.recent_orders(10).len(), 3);
    }

    #[test]
    fn record_order_leaves_cart_alone() {
        let s = add(&CartState::default(), line("a", 1, 100));
        let next = s.apply(CartCommand::RecordOrder(order("o1"))).unwrap();
        assert_eq!(next.lines(), s.lines());
        let changes = next.changes_since(&s);
        assert!(changes.orders);
        assert!(!changes.lines);
    }

    #[test]
    fn update_profile_merges() {
        let s = CartState::new(Profile {
            name: "John Doe".into(),
            email: "john@example.com".into(),
            phone: "+1".into(),
            address: "1 Main".into(),
        });
        let next = s
            .apply(CartCommand::UpdateProfile(ProfilePatch {
                phone: Some("+2".into()),
                ..Default::default()
            }))
            .unwrap();
        assert_eq!(next.profile().phone, "+2");
        assert_eq!(next.profile().name, "John Doe");
        assert!(next.changes_since(&s).profile);

        let same = next
            .apply(CartCommand::UpdateProfile(ProfilePatch::default()))
            .unwrap();
        assert!(!same.changes_since(&next).any());
    }

    #[test]
    fn checkout_records_and_clears_in_one_step() {
        let s = CartState::new(Profile {
            address: "123 Main St".into(),
            ..Default::default()
        });
        let s = add(&add(&s, line("pizza-1", 3, 1250)), line("cola", 2, 200));
        let placed_at = Utc::now();
        let next = s
            .apply(CartCommand::Checkout(CheckoutRequest {
                order_id: "o-42".into(),
                restaurant: RestaurantRef {
                    id: "r1".into(),
                    name: "Pizza Palace".into(),
                },
                pricing: PricingPolicy::default(),
                placed_at,
            }))
            .unwrap();

        assert!(next.is_empty());
        assert_eq!(next.orders().len(), 1);
        let placed = &next.orders()[0];
        assert_eq!(placed.id, "o-42");
        assert_eq!(placed.lines, s.lines());
        assert_eq!(placed.charges, s.quote(&PricingPolicy::default()));
        assert_eq!(placed.delivery_address.as_deref(), Some("123 Main St"));
        assert_eq!(placed.placed_at, placed_at);

        let changes = next.changes_since(&s);
        assert!(changes.lines && changes.orders);
        assert!(!changes.favorites && !changes.profile);
    }

    #[test]
    fn checkout_on_empty_cart_fails() {
        let res = CartState::default().apply(CartCommand::Checkout(CheckoutRequest {
            order_id: "o-1".into(),
            restaurant: RestaurantRef {
                id: "r1".into(),
                name: "Pizza Palace".into(),
            },
            pricing: PricingPolicy::default(),
            placed_at: Utc::now(),
        }));
        assert_eq!(res, Err(CartError::EmptyCart));
    }

    #[test]
    fn apply_is_deterministic() {
        let s = add(&CartState::default(), line("a", 1, 100));
        let cmd = CartCommand::AddToCart(line("a", 2, 100));
        assert_eq!(s.apply(cmd.clone()).unwrap(), s.apply(cmd).unwrap());
    }

    #[test]
    fn commands_use_tagged_json() {
        let cmd = CartCommand::RemoveFromCart { id: "a".into() };
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], "RemoveFromCart");
        assert_eq!(json["data"]["id"], "a");
        let back: CartCommand = serde_json::from_value(json).unwrap();
        assert_eq!(back, cmd);
    }

    #[test]
    fn amount_overflow_is_rejected_and_projections_stay_usable() {
        let big = CartLineItem::new(food("caviar"), 1, Decimal::MAX);
        let s = add(&CartState::default(), big.clone());
        assert_eq!(s.cart_total(), Decimal::MAX);

        assert_eq!(s.apply(CartCommand::AddToCart(big)), Err(CartError::AmountOverflow));
        assert_eq!(
            s.apply(CartCommand::AddToCart(line("bread", 1, 100))),
            Err(CartError::AmountOverflow)
        );
        assert_eq!(
            s.apply(CartCommand::UpdateQuantity {
                id: "caviar".into(),
                quantity: 2,
            }),
            Err(CartError::AmountOverflow)
        );
        assert_eq!(s.cart_item_count(), 1);

        // fees push the quote past the limit
        assert_eq!(s.quote(&PricingPolicy::default()).total, Decimal::MAX);
        let res = s.apply(CartCommand::Checkout(CheckoutRequest {
            order_id: "o-big".into(),
            restaurant: RestaurantRef {
                id: "r1".into(),
                name: "Pizza Palace".into(),
            },
            pricing: PricingPolicy::default(),
            placed_at: Utc::now(),
        }));
        assert_eq!(res, Err(CartError::AmountOverflow));
    }

    #[test]
    fn coupon_lowers_quote_and_is_replaced() {
        let s = add(&CartState::default(), line("pizza-1", 3, 1250));
        let s = s
            .apply(CartCommand::ApplyCoupon {
                code: "SAVE5".into(),
                discount: Decimal::new(500, 2),
            })
            .unwrap();
        assert_eq!(s.coupon().map(|c| c.code.as_str()), Some("SAVE5"));
        assert_eq!(s.cart_total(), Decimal::new(3750, 2));
        assert_eq!(s.quote(&PricingPolicy::free()).total, Decimal::new(3250, 2));

        let replaced = s
            .apply(CartCommand::ApplyCoupon {
                code: "HALF".into(),
                discount: Decimal::new(100_00, 2),
            })
            .unwrap();
        // discount never exceeds the subtotal
        assert_eq!(replaced.quote(&PricingPolicy::free()).total, Decimal::ZERO);

        let removed = replaced.apply(CartCommand::RemoveCoupon).unwrap();
        assert!(removed.coupon().is_none());
        assert_eq!(removed.changes_since(&replaced), CartChanges {
            coupon: true,
            ..Default::default()
        });
        let again = removed.apply(CartCommand::RemoveCoupon).unwrap();
        assert!(!again.changes_since(&removed).any());
    }

    #[test]
    fn invalid_coupon_is_rejected() {
        let s = CartState::default();
        assert_eq!(
            s.apply(CartCommand::ApplyCoupon {
                code: " ".into(),
                discount: Decimal::ONE,
            }),
            Err(CartError::EmptyCouponCode)
        );
        assert!(matches!(
            s.apply(CartCommand::ApplyCoupon {
                code: "X".into(),
                discount: Decimal::NEGATIVE_ONE,
            }),
            Err(CartError::NegativeDiscount { .. })
        ));
    }

    #[test]
    fn checkout_consumes_coupon() {
        let s = add(&CartState::default(), line("pizza-1", 1, 1250))
            .apply(CartCommand::ApplyCoupon {
                code: "SAVE2".into(),
                discount: Decimal::new(200, 2),
            })
            .unwrap();
        let next = s
            .apply(CartCommand::Checkout(CheckoutRequest {
                order_id: "o-7".into(),
                restaurant: RestaurantRef {
                    id: "r1".into(),
                    name: "Pizza Palace".into(),
                },
                pricing: PricingPolicy::free(),
                placed_at: Utc::now(),
            }))
            .unwrap();
        assert!(next.coupon().is_none());
        let placed = &next.orders()[0];
        assert_eq!(placed.coupon_code.as_deref(), Some("SAVE2"));
        assert_eq!(placed.charges.discount, Decimal::new(200, 2));
        assert_eq!(placed.total, Decimal::new(1050, 2));
    }

    #[test]
    fn clear_cart_drops_coupon() {
        let s = add(&CartState::default(), line("a", 1, 100))
            .apply(CartCommand::ApplyCoupon {
                code: "SAVE".into(),
                discount: Decimal::ONE,
            })
            .unwrap();
        let cleared = s.apply(CartCommand::ClearCart).unwrap();
        assert!(cleared.is_empty());
        assert!(cleared.coupon().is_none());
    }

    #[test]
    fn stored_snapshot_round_trips() {
        let s = add(&CartState::default(), line("a", 2, 100))
            .apply(CartCommand::AddFavorite {
                restaurant_id: "r1".into(),
            })
            .unwrap();
        let json = serde_json::to_string(&s).unwrap();
        let back: CartState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn stored_snapshot_with_broken_lines_is_rejected() {
        let stored = |lines: &str| {
            format!(
                r#"{{"lines":{lines},"orders":[],"favorite_ids":[],"profile":{{"name":"","email":"","phone":"","address":""}}}}"#
            )
        };
        let a = |qty: u32| {
            format!(
                r#"{{"id":"a","food_item":{{"id":"a","restaurant_id":"r1","name":"A"}},"quantity":{qty},"unit_price":"1.00"}}"#
            )
        };

        let ok = serde_json::from_str::<CartState>(&stored(&format!("[{}]", a(2)))).unwrap();
        assert_eq!(ok.cart_item_count(), 2);
        assert!(ok.coupon().is_none());

        let zero = serde_json::from_str::<CartState>(&stored(&format!("[{}]", a(0))));
        assert!(zero.unwrap_err().to_string().contains("at least 1"));

        let duplicate = serde_json::from_str::<CartState>(&stored(&format!("[{},{}]", a(1), a(2))));
        assert!(duplicate.unwrap_err().to_string().contains("more than once"));
    }
}
