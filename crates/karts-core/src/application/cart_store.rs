use chrono::Utc;
use karts_types::domain::cart::{CartCommand, CartError, CartLineItem, CartState};
use karts_types::domain::order::{CheckoutRequest, Order, RestaurantRef};
use karts_types::domain::pricing::{OrderCharges, PricingPolicy};
use karts_types::domain::profile::ProfilePatch;
use karts_types::ports::cart_repository::CartRepository;
use karts_types::ports::RepoError;
use rust_decimal::Decimal;
use tokio::sync::watch;
use tracing::{debug, warn};
use uuid::Uuid;

/// Owner of the cart snapshot.
///
/// Commands go through `&mut self`, so exactly one writer exists and each
/// command finishes before the next starts. Readers clone the latest
/// snapshot or hold a [`watch::Receiver`] from [`CartStore::subscribe`];
/// no-op commands are not republished.
pub struct CartStore {
    state: watch::Sender<CartState>,
    pricing: PricingPolicy,
}

impl CartStore {
    pub fn new(initial: CartState, pricing: PricingPolicy) -> Self {
        let (state, _) = watch::channel(initial);
        Self { state, pricing }
    }

    /// Rebuild the store from the snapshot saved for `owner_id`, or start empty.
    pub async fn restore<R: CartRepository>(
        repo: &R,
        owner_id: &str,
        pricing: PricingPolicy,
    ) -> Result<Self, RepoError> {
        let initial = repo.load_cart(owner_id).await?.unwrap_or_default();
        debug!(owner_id, lines = initial.lines().len(), "cart restored");
        Ok(Self::new(initial, pricing))
    }

    pub async fn save_to<R: CartRepository>(&self, repo: &R, owner_id: &str) -> Result<(), RepoError> {
        repo.save_cart(owner_id, &self.snapshot()).await
    }

    pub fn snapshot(&self) -> CartState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.state.subscribe()
    }

    pub fn pricing(&self) -> &PricingPolicy {
        &self.pricing
    }

    pub fn dispatch(&mut self, command: CartCommand) -> Result<CartState, CartError> {
        let name = command.name();
        let current = self.snapshot();
        let next = current.apply(command).inspect_err(|e| {
            warn!(command = name, error = %e, "cart command rejected");
        })?;
        if next.changes_since(&current).any() {
            self.state.send_replace(next.clone());
            debug!(
                command = name,
                lines = next.lines().len(),
                items = next.cart_item_count(),
                "cart updated"
            );
        }
        Ok(next)
    }

    pub fn add_to_cart(&mut self, line: CartLineItem) -> Result<CartState, CartError> {
        self.dispatch(CartCommand::AddToCart(line))
    }

    pub fn remove_from_cart(&mut self, id: &str) -> CartState {
        self.infallible(CartCommand::RemoveFromCart { id: id.into() })
    }

    pub fn update_quantity(&mut self, id: &str, quantity: i64) -> Result<CartState, CartError> {
        self.dispatch(CartCommand::UpdateQuantity {
            id: id.into(),
            quantity,
        })
    }

    pub fn clear_cart(&mut self) -> CartState {
        self.infallible(CartCommand::ClearCart)
    }

    pub fn add_favorite(&mut self, restaurant_id: &str) -> Result<CartState, CartError> {
        self.dispatch(CartCommand::AddFavorite {
            restaurant_id: restaurant_id.into(),
        })
    }

    pub fn remove_favorite(&mut self, restaurant_id: &str) -> CartState {
        self.infallible(CartCommand::RemoveFavorite {
            restaurant_id: restaurant_id.into(),
        })
    }

    /// Returns whether the restaurant is a favorite afterwards.
    pub fn toggle_favorite(&mut self, restaurant_id: &str) -> Result<bool, CartError> {
        if self.is_favorite(restaurant_id) {
            self.remove_favorite(restaurant_id);
            Ok(false)
        } else {
            self.add_favorite(restaurant_id)?;
            Ok(true)
        }
    }

    pub fn record_order(&mut self, order: Order) -> CartState {
        self.infallible(CartCommand::RecordOrder(order))
    }

    pub fn update_profile(&mut self, patch: ProfilePatch) -> CartState {
        self.infallible(CartCommand::UpdateProfile(patch))
    }

    pub fn apply_coupon(&mut self, code: &str, discount: Decimal) -> Result<CartState, CartError> {
        self.dispatch(CartCommand::ApplyCoupon {
            code: code.into(),
            discount,
        })
    }

    pub fn remove_coupon(&mut self) -> CartState {
        self.infallible(CartCommand::RemoveCoupon)
    }

    /// Place an order for everything in the cart and empty it, as one transition.
    pub fn checkout(&mut self, restaurant: RestaurantRef) -> Result<Order, CartError> {
        let request = CheckoutRequest {
            order_id: Uuid::new_v4().to_string(),
            restaurant,
            pricing: self.pricing,
            placed_at: Utc::now(),
        };
        let next = self.dispatch(CartCommand::Checkout(request))?;
        next.orders()
            .first()
            .cloned()
            .ok_or(CartError::EmptyCart)
    }

    pub fn cart_total(&self) -> Decimal {
        self.state.borrow().cart_total()
    }

    pub fn cart_item_count(&self) -> u64 {
        self.state.borrow().cart_item_count()
    }

    pub fn is_favorite(&self, restaurant_id: &str) -> bool {
        self.state.borrow().is_favorite(restaurant_id)
    }

    pub fn quote(&self) -> OrderCharges {
        self.state.borrow().quote(&self.pricing)
    }

    // For commands that `CartState::apply` never rejects.
    fn infallible(&mut self, command: CartCommand) -> CartState {
        match self.dispatch(command) {
            Ok(next) => next,
            Err(_) => self.snapshot(),
        }
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new(CartState::default(), PricingPolicy::default())
    }
}
