pub mod auth_backend;
pub mod cart_repository;
pub mod identity_store;

pub use cart_repository::RepoError;
