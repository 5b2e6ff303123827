//! Account aggregate

pub mod api;
pub mod entity;
pub mod repository;
pub mod service;
