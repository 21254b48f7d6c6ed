//! karts-types: domain model and ports shared by the cart and session stores

pub mod domain;
pub mod ports;
