//! Shared infrastructure

pub mod error;
pub mod middleware;
