use async_trait::async_trait;

use crate::domain::identity::{Identity, RegistrationData};

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("account already exists: {0}")]
    AlreadyRegistered(String),
    #[error("auth backend unavailable: {0}")]
    Unavailable(String),
}

/// Credential check behind sign-in and sign-up.
#[async_trait]
pub trait AuthBackend: Send + Sync + 'static {
    async fn authenticate(&self, email: &str, password: &str) -> Result<Identity, AuthError>;
    async fn register(&self, data: RegistrationData) -> Result<Identity, AuthError>;
}
