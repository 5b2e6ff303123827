//! AuthGate server.
//!
//! Wires configuration, the SQLite identity store, token issuance, and the
//! HTTP pipeline into one process. The pipeline order is fixed: request
//! tracing, then authentication state, then the API and OAuth routes, with
//! the static SPA as the fallback.

use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tower_http::{
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use ag_config::ConfigLoader;
use ag_identity::account::api::{identity_router, resources_router};
use ag_identity::oauth::token_api::oauth_router;
use ag_identity::oauth::well_known::well_known_router;
use ag_identity::{
    init_schema, seed, AccountRepository, AppState, AuthLayer, IdentityOptions, IdentityService,
    PasswordHasher, PasswordPolicy, PolicyRegistry, ResourceRegistry, RoleRepository, SigningKeys,
    TokenConfig, TokenService,
};

#[derive(OpenApi)]
#[openapi(
    info(title = "AuthGate", description = "Identity and token-issuance gateway"),
    paths(
        ag_identity::account::api::register,
        ag_identity::account::api::login,
        ag_identity::account::api::logout,
        ag_identity::account::api::me,
        ag_identity::account::api::confirm_email,
        ag_identity::account::api::forgot_password,
        ag_identity::account::api::reset_password,
        ag_identity::account::api::change_password,
        ag_identity::account::api::list_accounts,
        ag_identity::account::api::get_account,
        ag_identity::account::api::deactivate_account,
        ag_identity::account::api::assign_role,
        ag_identity::account::api::remove_role,
        ag_identity::account::api::values,
        ag_identity::account::api::identity_claims,
        ag_identity::oauth::token_api::token,
        ag_identity::oauth::well_known::openid_configuration,
        ag_identity::oauth::well_known::jwks,
        ag_identity::oauth::well_known::userinfo,
    ),
    components(schemas(
        ag_identity::account::api::RegisterRequest,
        ag_identity::account::api::RegisterResponse,
        ag_identity::account::api::LoginRequest,
        ag_identity::account::api::SessionResponse,
        ag_identity::account::api::ConfirmEmailRequest,
        ag_identity::account::api::ForgotPasswordRequest,
        ag_identity::account::api::ForgotPasswordResponse,
        ag_identity::account::api::ResetPasswordRequest,
        ag_identity::account::api::ChangePasswordRequest,
        ag_identity::account::api::RoleAssignmentRequest,
        ag_identity::oauth::token_api::TokenRequest,
        ag_identity::oauth::token_api::TokenResponse,
        ag_identity::oauth::token_api::TokenErrorBody,
        ag_identity::oauth::well_known::OpenIdConfiguration,
        ag_identity::oauth::well_known::Jwk,
        ag_identity::oauth::well_known::JwksDocument,
        ag_identity::oauth::well_known::UserInfo,
        ag_identity::AccountView,
        ag_identity::Claim,
        ag_identity::shared::error::ErrorResponse,
    ))
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    ag_common::logging::init_logging("ag-server");
    let config = ConfigLoader::new().load().context("Failed to load configuration")?;

    let connection_string = config
        .require_connection_string()
        .context("A default connection string is required")?;

    let connect_options = SqliteConnectOptions::from_str(connection_string)
        .context("Invalid connection string")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .context("Failed to open the identity database")?;
    init_schema(&pool).await?;

    let identity = IdentityService::new(
        AccountRepository::new(pool.clone()),
        RoleRepository::new(pool),
        PasswordHasher::new(PasswordPolicy::default()),
        IdentityOptions {
            max_failed_attempts: i64::from(config.auth.max_failed_attempts),
            lockout_secs: config.auth.lockout_secs,
            ..IdentityOptions::default()
        },
    );
    seed::seed(&identity, config.dev_mode).await?;

    // Fresh key material every start; outstanding tokens die with the process
    let keys = SigningKeys::generate_ephemeral()?;
    let tokens = TokenService::new(
        TokenConfig {
            issuer: config.auth.authority.clone(),
            audience: config.auth.audience.clone(),
        },
        &keys,
    )?;

    let state = AppState {
        identity,
        tokens: Arc::new(tokens),
        keys: Arc::new(keys),
        policies: PolicyRegistry::with_default_policies(),
        registry: ResourceRegistry::with_defaults(),
        allowed_scopes: Arc::new(config.auth.allowed_scopes.clone()),
        access_token_lifetime_secs: config.auth.access_token_expiry_secs,
    };

    let static_dir = config.http.static_dir.clone();
    let spa = ServeDir::new(&static_dir)
        .not_found_service(ServeFile::new(format!("{static_dir}/index.html")));

    let app = Router::new()
        .merge(identity_router())
        .merge(resources_router())
        .merge(oauth_router())
        .merge(well_known_router())
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .fallback_service(spa)
        .with_state(state.clone())
        .layer(AuthLayer::new(state))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.http.host, config.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(
        addr = %addr,
        authority = %config.auth.authority,
        "AuthGate listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received terminate signal"),
    }
}
