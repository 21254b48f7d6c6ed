//! karts-core: cart and session stores for the ordering app

pub mod config;
pub mod errors;

pub mod application;

pub use karts_types::{domain, ports};

pub mod outbound; // mocked auth backend
