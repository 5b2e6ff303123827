//! Authentication middleware and extractors.
//!
//! `AuthLayer` injects the shared `AppState` into request extensions so the
//! `Authenticated` extractor can validate credentials without a state bound
//! on every handler. Tokens arrive as a bearer header or, for browser
//! clients, a session cookie carrying the same access token.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
};
use axum_extra::extract::cookie::CookieJar;
use tower::{Layer, Service};

use crate::account::service::IdentityService;
use crate::auth::signing::SigningKeys;
use crate::auth::token_service::{extract_bearer_token, TokenService};
use crate::authz::{AuthContext, PolicyRegistry};
use crate::oauth::registry::ResourceRegistry;
use crate::shared::error::{GatewayError, Result};

/// Session cookie carrying an access token for browser clients.
pub const SESSION_COOKIE: &str = "ag_session";

/// Shared application state, assembled once at startup.
#[derive(Clone)]
pub struct AppState {
    pub identity: IdentityService,
    pub tokens: Arc<TokenService>,
    pub keys: Arc<SigningKeys>,
    pub policies: PolicyRegistry,
    pub registry: ResourceRegistry,

    /// Scopes a token must carry at least one of to reach protected routes
    pub allowed_scopes: Arc<Vec<String>>,

    pub access_token_lifetime_secs: i64,
}

impl AppState {
    /// Authorize a named policy for the given context.
    pub fn authorize(&self, policy: &str, context: &AuthContext) -> Result<()> {
        self.policies.authorize(policy, context)
    }
}

/// Tower layer placing `AppState` into request extensions.
#[derive(Clone)]
pub struct AuthLayer {
    state: AppState,
}

impl AuthLayer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

impl<S> Layer<S> for AuthLayer {
    type Service = AuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthMiddleware {
            inner,
            state: self.state.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AuthMiddleware<S> {
    inner: S,
    state: AppState,
}

impl<S> Service<Request> for AuthMiddleware<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        request.extensions_mut().insert(self.state.clone());
        self.inner.call(request)
    }
}

/// Extractor for authenticated requests.
///
/// Validation order: credential presence, signature/issuer/audience/expiry,
/// then the scope allow-list. Every failure is a 401; policy checks inside
/// handlers produce the 403s.
#[derive(Debug)]
pub struct Authenticated {
    pub context: AuthContext,
}

#[async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let state = parts
            .extensions
            .get::<AppState>()
            .cloned()
            .ok_or_else(|| GatewayError::internal("AuthLayer not installed"))?;

        let token = credential_from_parts(parts).ok_or_else(|| {
            GatewayError::unauthorized("Missing bearer token or session cookie")
        })?;

        let claims = state.tokens.validate(&token)?;

        if !state.allowed_scopes.iter().any(|s| claims.has_scope(s)) {
            return Err(GatewayError::unauthorized(
                "Token carries no accepted scope",
            ));
        }

        Ok(Self {
            context: AuthContext::from_token(&claims),
        })
    }
}

fn credential_from_parts(parts: &Parts) -> Option<String> {
    if let Some(value) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(token) = extract_bearer_token(value) {
            return Some(token.to_string());
        }
    }

    CookieJar::from_headers(&parts.headers)
        .get(SESSION_COOKIE)
        .map(|c| c.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::repository::{init_schema, AccountRepository};
    use crate::account::service::IdentityOptions;
    use crate::auth::password::{PasswordHasher, PasswordPolicy};
    use crate::auth::signing::SigningKeys;
    use crate::auth::token_service::TokenConfig;
    use crate::role::repository::RoleRepository;
    use axum::http::Request as HttpRequest;
    use sqlx::sqlite::SqlitePoolOptions;

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
            registry: ResourceRegistry::with_defaults(),
            allowed_scopes: Arc::new(vec!["WebAPI".to_string()]),
            access_token_lifetime_secs: 3600,
        }
    }

    fn parts_with(state: AppState, header_value: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder().uri("/api/resource");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        let (mut parts, ()) = builder.body(()).unwrap().into_parts();
        parts.extensions.insert(state);
        parts
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let state = test_state().await;
        let mut parts = parts_with(state, None);
        let err = Authenticated::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn valid_bearer_token_yields_a_context() {
        let state = test_state().await;
        let token = state
            .tokens
            .issue(
                "acct-1",
                "spa",
                &["WebAPI".to_string()],
                vec!["user".to_string()],
                None,
                3600,
            )
            .unwrap();

        let mut parts = parts_with(state, Some(&format!("Bearer {token}")));
        let auth = Authenticated::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(auth.context.subject, "acct-1");
        assert!(auth.context.has_role("user"));
    }

    #[tokio::test]
    async fn out_of_scope_tokens_are_rejected() {
        let state = test_state().await;
        let token = state
            .tokens
            .issue("acct-1", "spa", &["openid".to_string()], vec![], None, 3600)
            .unwrap();

        let mut parts = parts_with(state, Some(&format!("Bearer {token}")));
        let err = Authenticated::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn session_cookie_is_accepted() {
        let state = test_state().await;
        let token = state
            .tokens
            .issue(
                "acct-1",
                "spa",
                &["WebAPI".to_string()],
                vec!["user".to_string()],
                None,
                3600,
            )
            .unwrap();

        let request = HttpRequest::builder()
            .uri("/api/resource")
            .header(header::COOKIE, format!("{SESSION_COOKIE}={token}"))
            .body(())
            .unwrap();
        let (mut parts, ()) = request.into_parts();
        parts.extensions.insert(state);

        let auth = Authenticated::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(auth.context.subject, "acct-1");
    }

    #[tokio::test]
    async fn garbage_tokens_are_invalid() {
        let state = test_state().await;
        let mut parts = parts_with(state, Some("Bearer not-a-jwt"));
        let err = Authenticated::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken { .. }));
    }
}
