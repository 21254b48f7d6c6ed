use karts_core::application::cart_store::CartStore;
use karts_core::application::session_store::SessionStore;
use karts_core::config::Config;
use karts_core::domain::cart::{CartLineItem, FoodItemRef};
use karts_core::domain::order::RestaurantRef;
use karts_core::outbound::mock_auth::MockAuthBackend;
use karts_repo::{build_repo, Repo};
use rust_decimal::Decimal;
use tracing::info;

// Walks one customer session end to end: restore or sign in, fill the cart,
// check out, persist.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL and the KARTS_* knobs when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
        .init();

    let config = Config::from_env()?;
    let repo: Repo = build_repo(config.database_url.as_deref()).await?;
    info!(backend = repo.backend_name(), "repository ready");

    let session = SessionStore::new(MockAuthBackend::from_config(&config), repo.clone());
    let user = match session.restore().await? {
        Some(user) => user,
        None => {
            let email = std::env::args()
                .nth(1)
                .unwrap_or_else(|| "a@b.com".to_string());
            session.sign_in(&email, "demo").await?
        }
    };
    info!(user_id = %user.id, role = ?user.role, "session active");

    let mut cart = CartStore::restore(&repo, &user.id, config.pricing).await?;
    cart.add_to_cart(CartLineItem::new(
        FoodItemRef {
            id: "pizza-1".into(),
            restaurant_id: "r1".into(),
            name: "Margherita".into(),
        },
        2,
        Decimal::new(1250, 2),
    ))?;
    let quote = cart.quote();
    info!(
        subtotal = %quote.subtotal,
        tax = %quote.tax,
        total = %quote.total,
        items = cart.cart_item_count(),
        "cart ready"
    );

    let order = cart.checkout(RestaurantRef {
        id: "r1".into(),
        name: "Pizza Palace".into(),
    })?;
    cart.save_to(&repo, &user.id).await?;
    info!(
        order_id = %order.id,
        total = %order.total,
        eta = %order.estimated_delivery_at,
        past_orders = cart.snapshot().orders().len(),
        "order placed"
    );
    Ok(())
}
