//! Shared utilities for AuthGate services.

pub mod logging;
