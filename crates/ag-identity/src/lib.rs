//! AuthGate Identity
//!
//! Core crate providing:
//! - Relational (SQLite) identity store for accounts and roles
//! - Password policy enforcement and Argon2id credential verification
//! - Claims-based authorization with named predicate policies
//! - OAuth2/OIDC-style token issuance with ephemeral signing keys
//! - Axum authentication middleware and REST endpoints
//!
//! ## Module Organization (Aggregate-based)
//!
//! Each aggregate contains:
//! - `entity` - Domain entities
//! - `repository` - Data access
//! - `api` - REST endpoints (where applicable)

// Core aggregates
pub mod account;
pub mod role;

// Authentication & authorization
pub mod auth;
pub mod authz;
pub mod oauth;

// Shared infrastructure
pub mod shared;

// Startup data seeding
pub mod seed;

// Re-export common types from shared
pub use shared::error::{GatewayError, Result};
pub use shared::middleware::{AppState, AuthLayer, Authenticated, SESSION_COOKIE};

// Re-export main entity types for convenience
pub use account::entity::{AccountView, IdentityToken, TokenPurpose, UserAccount};
pub use role::entity::Role;

// Re-export repositories
pub use account::repository::{init_schema, AccountRepository};
pub use role::repository::RoleRepository;

// Re-export services
pub use account::service::{IdentityOptions, IdentityService};
pub use auth::password::{PasswordHasher, PasswordPolicy};
pub use auth::signing::SigningKeys;
pub use auth::token_service::{AccessTokenClaims, TokenConfig, TokenService};
pub use authz::{AuthContext, Claim, PolicyRegistry};
pub use oauth::registry::{
    ApiResource, ClientRegistration, GrantType, IdentityResource, ResourceRegistry, SPA_CLIENT_ID,
};
