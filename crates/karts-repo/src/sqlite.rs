use async_trait::async_trait;
use chrono::Utc;
use karts_types::domain::cart::CartState;
use karts_types::domain::identity::Identity;
use karts_types::ports::cart_repository::CartRepository;
use karts_types::ports::identity_store::IdentityStore;
use karts_types::ports::RepoError;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;

/// Only one identity is signed in per device.
const SESSION_SLOT: &str = "current";

const MIGRATIONS: [&str; 2] = [
    include_str!("../migrations/0001_create_carts.sql"),
    include_str!("../migrations/0002_create_session.sql"),
];

#[derive(Clone)]
pub struct SqliteRepo {
    pool: SqlitePool,
}

#[derive(FromRow)]
struct DbCart {
    state_json: String,
}

#[derive(FromRow)]
struct DbSession {
    identity_json: String,
}

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        for ddl in MIGRATIONS {
            sqlx::query(ddl).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl CartRepository for SqliteRepo {
    async fn load_cart(&self, owner_id: &str) -> Result<Option<CartState>, RepoError> {
        let row: Option<DbCart> = sqlx::query_as("SELECT state_json FROM carts WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::DbError(e.to_string()))?;
        row.map(|r| serde_json::from_str(&r.state_json).map_err(|e| RepoError::Corrupt(e.to_string())))
            .transpose()
    }

    async fn save_cart(&self, owner_id: &str, state: &CartState) -> Result<(), RepoError> {
        let state_json =
            serde_json::to_string(state).map_err(|e| RepoError::DbError(e.to_string()))?;
        sqlx::query(
            "INSERT INTO carts (owner_id, state_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(owner_id) DO UPDATE SET state_json = excluded.state_json, updated_at = excluded.updated_at",
        )
        .bind(owner_id)
        .bind(state_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::DbError(e.to_string()))?;
        Ok(())
    }

    async fn delete_cart(&self, owner_id: &str) -> Result<bool, RepoError> {
        let res = sqlx::query("DELETE FROM carts WHERE owner_id = ?")
            .bind(owner_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RepoError::DbError(e.to_string()))?;
        Ok(res.rows_affected() > 0)
    }
}

#[async_trait]
impl IdentityStore for SqliteRepo {
    async fn load(&self) -> Result<Option<Identity>, RepoError> {
        let row: Option<DbSession> =
            sqlx::query_as("SELECT identity_json FROM session WHERE slot = ?")
                .bind(SESSION_SLOT)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| RepoError::DbError(e.to_string()))?;
        row.map(|r| {
            serde_json::from_str(&r.identity_json).map_err(|e| RepoError::Corrupt(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, identity: Option<&Identity>) -> Result<(), RepoError> {
        let Some(identity) = identity else {
            sqlx::query("DELETE FROM session WHERE slot = ?")
                .bind(SESSION_SLOT)
                .execute(&self.pool)
                .await
                .map_err(|e| RepoError::DbError(e.to_string()))?;
            return Ok(());
        };
        let identity_json =
            serde_json::to_string(identity).map_err(|e| RepoError::DbError(e.to_string()))?;
        sqlx::query(
            "INSERT INTO session (slot, identity_json, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(slot) DO UPDATE SET identity_json = excluded.identity_json, updated_at = excluded.updated_at",
        )
        .bind(SESSION_SLOT)
        .bind(identity_json)
        .bind(identity.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::DbError(e.to_string()))?;
        Ok(())
    }
}
