//! Role aggregate

pub mod entity;
pub mod repository;
