//! Account and session endpoints.
//!
//! Registration and the password flows are public; everything under
//! `/identity/accounts` requires the manage-accounts policy. Browser
//! sessions are a cookie carrying the same access token the OAuth
//! endpoint would issue.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::account::entity::AccountView;
use crate::authz::{POLICY_ACCESS_RESOURCES, POLICY_MANAGE_ACCOUNTS};
use crate::oauth::registry::SPA_CLIENT_ID;
use crate::shared::error::Result;
use crate::shared::middleware::{AppState, Authenticated, SESSION_COOKIE};

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone_number: Option<String>,
}

/// Registration response. The confirmation token is returned directly;
/// there is no mail delivery in this service.
#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub account: AccountView,
    pub confirmation_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub scope: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfirmEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForgotPasswordResponse {
    /// Present only when the account exists; callers get 202 either way
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reset_token: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleAssignmentRequest {
    pub role: String,
}

pub fn identity_router() -> Router<AppState> {
    Router::new()
        .route("/identity/register", post(register))
        .route("/identity/login", post(login))
        .route("/identity/logout", post(logout))
        .route("/identity/me", get(me))
        .route("/identity/confirm-email", post(confirm_email))
        .route("/identity/forgot-password", post(forgot_password))
        .route("/identity/reset-password", post(reset_password))
        .route("/identity/change-password", post(change_password))
        .route("/identity/accounts", get(list_accounts))
        .route("/identity/accounts/:id", get(get_account))
        .route("/identity/accounts/:id/deactivate", post(deactivate_account))
        .route("/identity/accounts/:id/roles", post(assign_role))
        .route("/identity/accounts/:id/roles/:role", axum::routing::delete(remove_role))
}

/// Protected sample resources, mirroring the SPA's API surface.
pub fn resources_router() -> Router<AppState> {
    Router::new()
        .route("/api/values", get(values))
        .route("/api/identity", get(identity_claims))
}

#[utoipa::path(
    post,
    path = "/identity/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = RegisterResponse),
        (status = 400, description = "Password policy or email validation failed"),
        (status = 409, description = "Email already registered")
    ),
    tag = "identity"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let (account, confirmation_token) = state
        .identity
        .register(
            &request.email,
            &request.password,
            request.given_name,
            request.family_name,
            request.phone_number,
        )
        .await?;

    let roles = state.identity.accounts().roles_for_account(&account.id).await?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            account: account.to_view(roles),
            confirmation_token,
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/identity/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session established", body = SessionResponse),
        (status = 401, description = "Invalid credentials or locked account")
    ),
    tag = "identity"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse> {
    let account = state
        .identity
        .verify_credentials(&request.email, &request.password)
        .await?;

    let roles = state.identity.accounts().roles_for_account(&account.id).await?;
    let scopes: Vec<String> = state.allowed_scopes.as_ref().clone();
    let token = state.tokens.issue(
        &account.id,
        SPA_CLIENT_ID,
        &scopes,
        roles,
        Some(account.email.clone()),
        state.access_token_lifetime_secs,
    )?;

    let cookie = Cookie::build((SESSION_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();

    Ok((
        jar.add(cookie),
        Json(SessionResponse {
            access_token: token,
            token_type: "Bearer".to_string(),
            expires_in: state.access_token_lifetime_secs,
            scope: scopes.join(" "),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/identity/logout",
    responses((status = 204, description = "Session cleared")),
    tag = "identity"
)]
pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let cookie = Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .build();
    (jar.remove(cookie), StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/identity/me",
    responses(
        (status = 200, description = "The authenticated account", body = AccountView),
        (status = 401, description = "Not authenticated")
    ),
    tag = "identity"
)]
pub async fn me(State(state): State<AppState>, auth: Authenticated) -> Result<Json<AccountView>> {
    let account = state.identity.accounts().get_by_id(&auth.context.subject).await?;
    let roles = state.identity.accounts().roles_for_account(&account.id).await?;
    Ok(Json(account.to_view(roles)))
}

#[utoipa::path(
    post,
    path = "/identity/confirm-email",
    request_body = ConfirmEmailRequest,
    responses(
        (status = 204, description = "Email confirmed"),
        (status = 401, description = "Unknown, expired, or already-used token")
    ),
    tag = "identity"
)]
pub async fn confirm_email(
    State(state): State<AppState>,
    Json(request): Json<ConfirmEmailRequest>,
) -> Result<StatusCode> {
    state.identity.confirm_email(&request.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/forgot-password",
    request_body = ForgotPasswordRequest,
    responses((status = 202, description = "Accepted whether or not the account exists")),
    tag = "identity"
)]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(request): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse> {
    let reset_token = state.identity.issue_password_reset_token(&request.email).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(ForgotPasswordResponse { reset_token }),
    ))
}

#[utoipa::path(
    post,
    path = "/identity/reset-password",
    request_body = ResetPasswordRequest,
    responses(
        (status = 204, description = "Password replaced"),
        (status = 400, description = "New password fails the policy"),
        (status = 401, description = "Unknown, expired, or already-used token")
    ),
    tag = "identity"
)]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(request): Json<ResetPasswordRequest>,
) -> Result<StatusCode> {
    state
        .identity
        .reset_password(&request.token, &request.new_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 204, description = "Password changed"),
        (status = 400, description = "New password fails the policy"),
        (status = 401, description = "Current password wrong or not authenticated")
    ),
    tag = "identity"
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: Authenticated,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<StatusCode> {
    state
        .identity
        .change_password(
            &auth.context.subject,
            &request.current_password,
            &request.new_password,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/identity/accounts",
    responses(
        (status = 200, description = "All accounts", body = [AccountView]),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "accounts"
)]
pub async fn list_accounts(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<Vec<AccountView>>> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;

    let accounts = state.identity.accounts().list().await?;
    let mut views = Vec::with_capacity(accounts.len());
    for account in accounts {
        let roles = state.identity.accounts().roles_for_account(&account.id).await?;
        views.push(account.to_view(roles));
    }
    Ok(Json(views))
}

#[utoipa::path(
    get,
    path = "/identity/accounts/{id}",
    params(("id" = String, Path, description = "Account ID")),
    responses(
        (status = 200, description = "The account", body = AccountView),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such account")
    ),
    tag = "accounts"
)]
pub async fn get_account(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<AccountView>> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;

    let account = state.identity.accounts().get_by_id(&id).await?;
    let roles = state.identity.accounts().roles_for_account(&account.id).await?;
    Ok(Json(account.to_view(roles)))
}

#[utoipa::path(
    post,
    path = "/identity/accounts/{id}/deactivate",
    params(("id" = String, Path, description = "Account ID")),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "accounts"
)]
pub async fn deactivate_account(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;
    state.identity.deactivate(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/identity/accounts/{id}/roles",
    params(("id" = String, Path, description = "Account ID")),
    request_body = RoleAssignmentRequest,
    responses(
        (status = 204, description = "Role assigned"),
        (status = 403, description = "Caller is not an administrator"),
        (status = 404, description = "No such account or role")
    ),
    tag = "accounts"
)]
pub async fn assign_role(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<String>,
    Json(request): Json<RoleAssignmentRequest>,
) -> Result<StatusCode> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;
    state.identity.add_role(&id, &request.role).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/identity/accounts/{id}/roles/{role}",
    params(
        ("id" = String, Path, description = "Account ID"),
        ("role" = String, Path, description = "Role name")
    ),
    responses(
        (status = 204, description = "Role removed"),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "accounts"
)]
pub async fn remove_role(
    State(state): State<AppState>,
    auth: Authenticated,
    Path((id, role)): Path<(String, String)>,
) -> Result<StatusCode> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;
    state.identity.remove_role(&id, &role).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/api/values",
    responses(
        (status = 200, description = "Sample protected values", body = [String]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Caller has neither the user nor administrator role")
    ),
    tag = "resources"
)]
pub async fn values(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<Vec<String>>> {
    state.authorize(POLICY_ACCESS_RESOURCES, &auth.context)?;
    Ok(Json(vec!["value1".to_string(), "value2".to_string()]))
}

#[utoipa::path(
    get,
    path = "/api/identity",
    responses(
        (status = 200, description = "The caller's claims"),
        (status = 403, description = "Caller is not an administrator")
    ),
    tag = "resources"
)]
pub async fn identity_claims(
    State(state): State<AppState>,
    auth: Authenticated,
) -> Result<Json<Vec<crate::authz::Claim>>> {
    state.authorize(POLICY_MANAGE_ACCOUNTS, &auth.context)?;
    Ok(Json(auth.context.claims))
}
