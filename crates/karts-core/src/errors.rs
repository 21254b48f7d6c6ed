use karts_types::ports::auth_backend::AuthError;
use thiserror::Error;

pub use karts_types::domain::cart::CartError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("another session operation is already in flight")]
    Busy,

    #[error("not signed in")]
    NotAuthenticated,

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}
