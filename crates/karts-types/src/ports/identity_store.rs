use async_trait::async_trait;

use super::RepoError;
use crate::domain::identity::Identity;

/// Durable slot for the signed-in identity.
///
/// `load` is called once at startup; `save` after every session transition,
/// with `None` on sign-out.
#[async_trait]
pub trait IdentityStore: Send + Sync + 'static {
    async fn load(&self) -> Result<Option<Identity>, RepoError>;
    async fn save(&self, identity: Option<&Identity>) -> Result<(), RepoError>;
}
