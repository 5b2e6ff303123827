//! Discovery endpoints.
//!
//! Serves the OpenID Provider configuration and the JWKS built from the
//! process's ephemeral signing key. After a restart the JWKS changes and
//! previously issued tokens stop validating.

use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use utoipa::ToSchema;

use crate::shared::error::Result;
use crate::shared::middleware::{AppState, Authenticated};

#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub jwks_uri: String,
    pub grant_types_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub response_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub r#use: String,
    pub alg: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JwksDocument {
    pub keys: Vec<Jwk>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserInfo {
    pub sub: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub roles: Vec<String>,
}

pub fn well_known_router() -> Router<AppState> {
    Router::new()
        .route("/.well-known/openid-configuration", get(openid_configuration))
        .route("/.well-known/jwks.json", get(jwks))
        .route("/connect/userinfo", get(userinfo))
}

#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    responses((status = 200, description = "Provider metadata", body = OpenIdConfiguration)),
    tag = "discovery"
)]
pub async fn openid_configuration(State(state): State<AppState>) -> Json<OpenIdConfiguration> {
    let issuer = state.tokens.issuer().trim_end_matches('/').to_string();
    Json(OpenIdConfiguration {
        token_endpoint: format!("{issuer}/connect/token"),
        userinfo_endpoint: format!("{issuer}/connect/userinfo"),
        jwks_uri: format!("{issuer}/.well-known/jwks.json"),
        issuer: state.tokens.issuer().to_string(),
        grant_types_supported: vec![
            "password".to_string(),
            "client_credentials".to_string(),
        ],
        scopes_supported: state.registry.all_scopes(),
        response_types_supported: vec!["token".to_string()],
        token_endpoint_auth_methods_supported: vec!["client_secret_post".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
    })
}

#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses((status = 200, description = "Current signing keys", body = JwksDocument)),
    tag = "discovery"
)]
pub async fn jwks(State(state): State<AppState>) -> Json<JwksDocument> {
    let components = state.keys.jwk_components();
    Json(JwksDocument {
        keys: vec![Jwk {
            kty: "RSA".to_string(),
            r#use: "sig".to_string(),
            alg: "RS256".to_string(),
            kid: state.keys.key_id().to_string(),
            n: components.n.clone(),
            e: components.e.clone(),
        }],
    })
}

#[utoipa::path(
    get,
    path = "/connect/userinfo",
    responses(
        (status = 200, description = "Claims about the authenticated subject", body = UserInfo),
        (status = 401, description = "Not authenticated")
    ),
    tag = "discovery"
)]
pub async fn userinfo(State(state): State<AppState>, auth: Authenticated) -> Result<Json<UserInfo>> {
    let roles = state
        .identity
        .accounts()
        .roles_for_account(&auth.context.subject)
        .await?;
    Ok(Json(UserInfo {
        sub: auth.context.subject,
        email: auth.context.email,
        roles,
    }))
}
