//! OAuth2/OIDC token issuance and discovery

pub mod registry;
pub mod token_api;
pub mod well_known;
