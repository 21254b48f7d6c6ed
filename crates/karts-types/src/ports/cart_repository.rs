use async_trait::async_trait;

use crate::domain::cart::CartState;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("db error: {0}")]
    DbError(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Cart snapshots keyed by the owning user id.
#[async_trait]
pub trait CartRepository: Send + Sync + 'static {
    async fn load_cart(&self, owner_id: &str) -> Result<Option<CartState>, RepoError>;
    async fn save_cart(&self, owner_id: &str, state: &CartState) -> Result<(), RepoError>;
    async fn delete_cart(&self, owner_id: &str) -> Result<bool, RepoError>;
}
