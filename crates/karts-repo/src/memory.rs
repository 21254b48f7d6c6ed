use async_trait::async_trait;
use dashmap::DashMap;
use karts_types::domain::cart::CartState;
use karts_types::domain::identity::Identity;
use karts_types::ports::cart_repository::CartRepository;
use karts_types::ports::identity_store::IdentityStore;
use karts_types::ports::RepoError;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct InMemoryRepo {
    pub carts: Arc<DashMap<String, CartState>>,
    pub identity: Arc<RwLock<Option<Identity>>>,
}

impl InMemoryRepo {
    pub fn new() -> Self {
        Self {
            carts: Arc::new(DashMap::new()),
            identity: Arc::new(RwLock::new(None)),
        }
    }
}

impl Default for InMemoryRepo {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CartRepository for InMemoryRepo {
    async fn load_cart(&self, owner_id: &str) -> Result<Option<CartState>, RepoError> {
        // CartState clones share their Arc'd fields.
        Ok(self.carts.get(owner_id).map(|r| r.clone()))
    }

    async fn save_cart(&self, owner_id: &str, state: &CartState) -> Result<(), RepoError> {
        self.carts.insert(owner_id.to_string(), state.clone());
        Ok(())
    }

    async fn delete_cart(&self, owner_id: &str) -> Result<bool, RepoError> {
        Ok(self.carts.remove(owner_id).is_some())
    }
}

#[async_trait]
impl IdentityStore for InMemoryRepo {
    async fn load(&self) -> Result<Option<Identity>, RepoError> {
        Ok(self.identity.read().await.clone())
    }

    async fn save(&self, identity: Option<&Identity>) -> Result<(), RepoError> {
        *self.identity.write().await = identity.cloned();
        Ok(())
    }
}
