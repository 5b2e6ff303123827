//! OAuth2 token endpoint.
//!
//! `POST /connect/token` accepts form-encoded grant requests and answers
//! with the RFC 6749 error vocabulary: `invalid_client` (401) for unknown
//! or misauthenticated clients, `unsupported_grant_type` and
//! `unauthorized_client` for grant problems, `invalid_scope` for scope
//! problems, and `invalid_grant` for bad resource-owner credentials.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Form, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::oauth::registry::GrantType;
use crate::shared::error::GatewayError;
use crate::shared::middleware::AppState;

/// Form body of a token request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Successful token response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

/// RFC 6749 error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Protocol error with its HTTP status.
#[derive(Debug)]
pub struct TokenError {
    status: StatusCode,
    body: TokenErrorBody,
}

impl TokenError {
    fn new(status: StatusCode, error: &str, description: impl Into<String>) -> Self {
        Self {
            status,
            body: TokenErrorBody {
                error: error.to_string(),
                error_description: Some(description.into()),
            },
        }
    }

    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_request", description)
    }

    pub fn invalid_client() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "invalid_client",
            "Client authentication failed",
        )
    }

    pub fn unauthorized_client() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unauthorized_client",
            "Client is not allowed to use this grant type",
        )
    }

    pub fn unsupported_grant_type(grant: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "unsupported_grant_type",
            format!("Unsupported grant type: {grant}"),
        )
    }

    pub fn invalid_scope(scope: &str) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_scope",
            format!("Scope not allowed: {scope}"),
        )
    }

    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_grant", description)
    }

    pub fn server_error() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            "Token issuance failed",
        )
    }

    pub fn error_code(&self) -> &str {
        &self.body.error
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub fn oauth_router() -> Router<AppState> {
    Router::new().route("/connect/token", post(token))
}

#[utoipa::path(
    post,
    path = "/connect/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Access token issued", body = TokenResponse),
        (status = 400, description = "Malformed or rejected grant", body = TokenErrorBody),
        (status = 401, description = "Client authentication failed", body = TokenErrorBody)
    ),
    tag = "oauth"
)]
pub async fn token(
    State(state): State<AppState>,
    Form(request): Form<TokenRequest>,
) -> Result<Json<TokenResponse>, TokenError> {
    issue_token(&state, request).await.map(Json)
}

pub async fn issue_token(
    state: &AppState,
    request: TokenRequest,
) -> Result<TokenResponse, TokenError> {
    let grant = match request.grant_type.as_str() {
        "password" => GrantType::Password,
        "client_credentials" => GrantType::ClientCredentials,
        other => return Err(TokenError::unsupported_grant_type(other)),
    };

    let client_id = request
        .client_id
        .as_deref()
        .ok_or_else(|| TokenError::invalid_request("client_id is required"))?;

    let client = state
        .registry
        .find_client(client_id)
        .ok_or_else(|| {
            warn!(client_id = %client_id, "Token request from unknown client");
            TokenError::invalid_client()
        })?
        .clone();

    if !client.authenticate(request.client_secret.as_deref()) {
        warn!(client_id = %client.client_id, "Client secret mismatch");
        return Err(TokenError::invalid_client());
    }

    if !client.supports_grant(grant) {
        return Err(TokenError::unauthorized_client());
    }

    let scopes: Vec<String> = match request.scope.as_deref() {
        Some(raw) if !raw.trim().is_empty() => {
            raw.split_whitespace().map(str::to_string).collect()
        }
        _ => client.allowed_scopes.clone(),
    };

    if let Err(offending) = state.registry.check_scopes(&client, &scopes) {
        return Err(TokenError::invalid_scope(offending));
    }

    let lifetime = client.access_token_lifetime_secs;

    let response = match grant {
        GrantType::Password => {
            let username = request
                .username
                .as_deref()
                .ok_or_else(|| TokenError::invalid_request("username is required"))?;
            let password = request
                .password
                .as_deref()
                .ok_or_else(|| TokenError::invalid_request("password is required"))?;

            let account = state
                .identity
                .verify_credentials(username, password)
                .await
                .map_err(|e| match e {
                    GatewayError::InvalidCredentials => {
                        TokenError::invalid_grant("Invalid username or password")
                    }
                    GatewayError::LockedOut { .. } => {
                        TokenError::invalid_grant("Account is temporarily locked")
                    }
                    _ => TokenError::server_error(),
                })?;

            let roles = state
                .identity
                .accounts()
                .roles_for_account(&account.id)
                .await
                .map_err(|_| TokenError::server_error())?;

            let token = state
                .tokens
                .issue(
                    &account.id,
                    &client.client_id,
                    &scopes,
                    roles,
                    Some(account.email.clone()),
                    lifetime,
                )
                .map_err(|_| TokenError::server_error())?;

            debug!(account_id = %account.id, client_id = %client.client_id, "Password grant succeeded");
            TokenResponse {
                access_token: token,
                token_type: "Bearer".to_string(),
                expires_in: lifetime,
                scope: scopes.join(" "),
            }
        }
        GrantType::ClientCredentials => {
            let token = state
                .tokens
                .issue(&client.client_id, &client.client_id, &scopes, vec![], None, lifetime)
                .map_err(|_| TokenError::server_error())?;

            debug!(client_id = %client.client_id, "Client credentials grant succeeded");
            TokenResponse {
                access_token: token,
                token_type: "Bearer".to_string(),
                expires_in: lifetime,
                scope: scopes.join(" "),
            }
        }
    };

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::repository::{init_schema, AccountRepository};
    use crate::account::service::{IdentityOptions, IdentityService};
    use crate::auth::password::{PasswordHasher, PasswordPolicy};
    use crate::auth::signing::SigningKeys;
    use crate::auth::token_service::{TokenConfig, TokenService};
    use crate::authz::PolicyRegistry;
    use crate::oauth::registry::{ApiResource, ClientRegistration, ResourceRegistry};
    use crate::role::repository::RoleRepository;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::Arc;

    async fn test_state() -> AppState {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();

        let keys = SigningKeys::generate_ephemeral().unwrap();
        let tokens = TokenService::new(
            TokenConfig {
                issuer: "http://localhost:5000/".to_string(),
                audience: "authgate".to_string(),
            },
            &keys,
        )
        .unwrap();

        let registry = ResourceRegistry::new(
            vec![
                ClientRegistration::public("spa", "SPA")
                    .with_scope("WebAPI")
                    .with_scope("openid"),
                ClientRegistration::confidential("worker", "Worker", "s3cret")
                    .with_scope("WebAPI"),
            ],
            vec![ApiResource::new("web-api", "Web API").with_scope("WebAPI")],
            vec![crate::oauth::registry::IdentityResource::openid()],
        );

        AppState {
            identity: IdentityService::new(
                AccountRepository::new(pool.clone()),
                RoleRepository::new(pool),
                PasswordHasher::new(PasswordPolicy::default()),
                IdentityOptions::default(),
            ),
            tokens: Arc::new(tokens),
            keys: Arc::new(keys),
            policies: PolicyRegistry::with_default_policies(),
            registry,
            allowed_scopes: Arc::new(vec!["WebAPI".to_string()]),
            access_token_lifetime_secs: 3600,
        }
    }

    fn password_request(username: &str, password: &str, scope: Option<&str>) -> TokenRequest {
        TokenRequest {
            grant_type: "password".to_string(),
            client_id: Some("spa".to_string()),
            client_secret: None,
            scope: scope.map(str::to_string),
            username: Some(username.to_string()),
            password: Some(password.to_string()),
        }
    }

    #[tokio::test]
    async fn password_grant_issues_a_validated_token() {
        let state = test_state().await;
        state
            .identity
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let response = issue_token(
            &state,
            password_request("user@example.com", "Passw0rdd", Some("WebAPI openid")),
        )
        .await
        .unwrap();

        assert_eq!(response.token_type, "Bearer");
        assert_eq!(response.expires_in, 3600);
        assert_eq!(response.scope, "WebAPI openid");

        let claims = state.tokens.validate(&response.access_token).unwrap();
        assert!(claims.has_scope("WebAPI"));
        assert!(claims.has_role("user"));
        assert_eq!(claims.client_id, "spa");
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
    }

    #[tokio::test]
    async fn unknown_clients_get_invalid_client() {
        let state = test_state().await;
        let mut request = password_request("user@example.com", "Passw0rdd", None);
        request.client_id = Some("ghost".to_string());

        let err = issue_token(&state, request).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_client");
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn wrong_secret_gets_invalid_client() {
        let state = test_state().await;
        let request = TokenRequest {
            grant_type: "client_credentials".to_string(),
            client_id: Some("worker".to_string()),
            client_secret: Some("wrong".to_string()),
            scope: Some("WebAPI".to_string()),
            username: None,
            password: None,
        };

        let err = issue_token(&state, request).await.unwrap_err();
        assert_eq!(err.error_code(), "invalid_client");
    }

    #[tokio::test]
    async fn grant_outside_the_client_allow_list_is_unauthorized_client() {
        let state = test_state().await;
        let request = TokenRequest {
            grant_type: "client_credentials".to_string(),
            client_id: Some("spa".to_string()),
            client_secret: None,
            scope: Some("WebAPI".to_string()),
            username: None,
            password: None,
        };

        let err = issue_token(&state, request).await.unwrap_err();
        assert_eq!(err.error_code(), "unauthorized_client");
    }

    #[tokio::test]
    async fn unknown_grant_types_are_rejected() {
        let state = test_state().await;
        let request = TokenRequest {
            grant_type: "authorization_code".to_string(),
            client_id: Some("spa".to_string()),
            client_secret: None,
            scope: None,
            username: None,
            password: None,
        };

        let err = issue_token(&state, request).await.unwrap_err();
        assert_eq!(err.error_code(), "unsupported_grant_type");
    }

    #[tokio::test]
    async fn disallowed_scopes_get_invalid_scope() {
        let state = test_state().await;
        state
            .identity
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let err = issue_token(
            &state,
            password_request("user@example.com", "Passw0rdd", Some("WebAPI payments")),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_scope");
    }

    #[tokio::test]
    async fn bad_credentials_get_invalid_grant() {
        let state = test_state().await;
        state
            .identity
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let err = issue_token(
            &state,
            password_request("user@example.com", "WrongPass1", None),
        )
        .await
        .unwrap_err();
        assert_eq!(err.error_code(), "invalid_grant");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn omitted_scope_defaults_to_the_client_allow_list() {
        let state = test_state().await;
        state
            .identity
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let response = issue_token(
            &state,
            password_request("user@example.com", "Passw0rdd", None),
        )
        .await
        .unwrap();
        assert_eq!(response.scope, "WebAPI openid");
    }

    #[tokio::test]
    async fn client_credentials_tokens_carry_no_user_context() {
        let state = test_state().await;
        let request = TokenRequest {
            grant_type: "client_credentials".to_string(),
            client_id: Some("worker".to_string()),
            client_secret: Some("s3cret".to_string()),
            scope: Some("WebAPI".to_string()),
            username: None,
            password: None,
        };

        let response = issue_token(&state, request).await.unwrap();
        let claims = state.tokens.validate(&response.access_token).unwrap();
        assert_eq!(claims.sub, "worker");
        assert!(claims.roles.is_empty());
        assert!(claims.email.is_none());
    }
}
