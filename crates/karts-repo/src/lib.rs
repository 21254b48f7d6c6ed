#[cfg(not(any(feature = "memory", feature = "sqlite")))]
compile_error!("Enable a repo feature: `memory` or `sqlite`.");

use karts_types::domain::cart::CartState;
use karts_types::domain::identity::Identity;
use karts_types::ports::cart_repository::CartRepository;
use karts_types::ports::identity_store::IdentityStore;
use karts_types::ports::RepoError;

#[cfg(feature = "memory")]
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(all(feature = "sqlite", not(feature = "memory")))]
const DEFAULT_DATABASE_URL: &str = "sqlite://karts.db";

/// Persistence backend chosen at startup.
#[derive(Clone)]
pub enum Repo {
    #[cfg(feature = "memory")]
    Memory(memory::InMemoryRepo),
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteRepo),
}

/// With both features on, a database url selects SQLite and its absence
/// selects the in-memory store. SQLite alone falls back to `karts.db`.
pub async fn build_repo(url: Option<&str>) -> anyhow::Result<Repo> {
    Repo::build_repo(url).await
}

impl Repo {
    #[cfg(all(feature = "memory", not(feature = "sqlite")))]
    pub async fn build_repo(_: Option<&str>) -> anyhow::Result<Self> {
        Ok(Self::Memory(memory::InMemoryRepo::new()))
    }

    #[cfg(all(feature = "sqlite", not(feature = "memory")))]
    pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Self> {
        let url = database_url.unwrap_or(DEFAULT_DATABASE_URL);
        Ok(Self::Sqlite(sqlite::SqliteRepo::new(url).await?))
    }

    #[cfg(all(feature = "sqlite", feature = "memory"))]
    pub async fn build_repo(database_url: Option<&str>) -> anyhow::Result<Self> {
        match database_url {
            Some(url) => Ok(Self::Sqlite(sqlite::SqliteRepo::new(url).await?)),
            None => Ok(Self::Memory(memory::InMemoryRepo::new())),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => "sqlite",
        }
    }
}

#[async_trait::async_trait]
impl CartRepository for Repo {
    async fn load_cart(&self, owner_id: &str) -> Result<Option<CartState>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(r) => r.load_cart(owner_id).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.load_cart(owner_id).await,
        }
    }

    async fn save_cart(&self, owner_id: &str, state: &CartState) -> Result<(), RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(r) => r.save_cart(owner_id, state).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.save_cart(owner_id, state).await,
        }
    }

    async fn delete_cart(&self, owner_id: &str) -> Result<bool, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(r) => r.delete_cart(owner_id).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.delete_cart(owner_id).await,
        }
    }
}

#[async_trait::async_trait]
impl IdentityStore for Repo {
    async fn load(&self) -> Result<Option<Identity>, RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(r) => r.load().await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.load().await,
        }
    }

    async fn save(&self, identity: Option<&Identity>) -> Result<(), RepoError> {
        match self {
            #[cfg(feature = "memory")]
            Self::Memory(r) => r.save(identity).await,
            #[cfg(feature = "sqlite")]
            Self::Sqlite(r) => r.save(identity).await,
        }
    }
}
