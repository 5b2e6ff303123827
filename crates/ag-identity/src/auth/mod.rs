//! Authentication primitives: password policy, signing keys, token service.

pub mod password;
pub mod signing;
pub mod token_service;
