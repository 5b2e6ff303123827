//! Static client and resource registry.
//!
//! Clients, API resources, and identity resources are defined in memory at
//! startup and are read-only for the process lifetime. No persistence.

use serde::Serialize;
use utoipa::ToSchema;

/// Client ID of the built-in single-page-application client. Session
/// logins issue their tokens under this registration.
pub const SPA_CLIENT_ID: &str = "spa";

/// Grants a client may use at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    Password,
    ClientCredentials,
}

/// An API a token can grant access to, with the scopes it exposes.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiResource {
    pub name: String,
    pub display_name: String,
    pub scopes: Vec<String>,
}

impl ApiResource {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            scopes: vec![name.clone()],
            name,
            display_name: display_name.into(),
        }
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        let scope = scope.into();
        if !self.scopes.contains(&scope) {
            self.scopes.push(scope);
        }
        self
    }
}

/// A user-identity scope (e.g. openid, profile).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct IdentityResource {
    pub name: String,
    pub display_name: String,
}

impl IdentityResource {
    pub fn openid() -> Self {
        Self {
            name: "openid".to_string(),
            display_name: "Your user identifier".to_string(),
        }
    }

    pub fn profile() -> Self {
        Self {
            name: "profile".to_string(),
            display_name: "User profile".to_string(),
        }
    }
}

/// A registered client application.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    /// Public identifier presented at the token endpoint
    pub client_id: String,

    /// Human-readable name
    pub client_name: String,

    /// Secret for confidential clients; None for public clients
    pub client_secret: Option<String>,

    /// Grants this client may use
    pub allowed_grants: Vec<GrantType>,

    /// Scopes this client may request
    pub allowed_scopes: Vec<String>,

    /// Lifetime of issued access tokens, seconds
    pub access_token_lifetime_secs: i64,

    /// Whether refresh is allowed via the offline_access scope
    pub allow_offline_access: bool,
}

impl ClientRegistration {
    pub fn public(client_id: impl Into<String>, client_name: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_name: client_name.into(),
            client_secret: None,
            allowed_grants: vec![GrantType::Password],
            allowed_scopes: vec![],
            access_token_lifetime_secs: 3600,
            allow_offline_access: false,
        }
    }

    pub fn confidential(
        client_id: impl Into<String>,
        client_name: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_name: client_name.into(),
            client_secret: Some(secret.into()),
            allowed_grants: vec![GrantType::ClientCredentials],
            allowed_scopes: vec![],
            access_token_lifetime_secs: 3600,
            allow_offline_access: false,
        }
    }

    pub fn with_grant(mut self, grant: GrantType) -> Self {
        if !self.allowed_grants.contains(&grant) {
            self.allowed_grants.push(grant);
        }
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.allowed_scopes.push(scope.into());
        self
    }

    pub fn with_offline_access(mut self) -> Self {
        self.allow_offline_access = true;
        self
    }

    pub fn with_token_lifetime(mut self, secs: i64) -> Self {
        self.access_token_lifetime_secs = secs;
        self
    }

    pub fn supports_grant(&self, grant: GrantType) -> bool {
        self.allowed_grants.contains(&grant)
    }

    /// Constant-shape secret check; public clients present no secret.
    pub fn authenticate(&self, presented_secret: Option<&str>) -> bool {
        match (&self.client_secret, presented_secret) {
            (None, _) => true,
            (Some(expected), Some(presented)) => expected == presented,
            (Some(_), None) => false,
        }
    }
}

/// The in-memory registry queried by the token endpoint.
#[derive(Clone)]
pub struct ResourceRegistry {
    clients: Vec<ClientRegistration>,
    api_resources: Vec<ApiResource>,
    identity_resources: Vec<IdentityResource>,
}

impl ResourceRegistry {
    pub fn new(
        clients: Vec<ClientRegistration>,
        api_resources: Vec<ApiResource>,
        identity_resources: Vec<IdentityResource>,
    ) -> Self {
        Self {
            clients,
            api_resources,
            identity_resources,
        }
    }

    /// Default wiring: the `web-api` resource exposing the `WebAPI` scope,
    /// openid/profile identity resources, and the SPA client using the
    /// resource-owner password grant.
    pub fn with_defaults() -> Self {
        Self::new(
            vec![ClientRegistration::public(SPA_CLIENT_ID, "Single Page Application")
                .with_scope("WebAPI")
                .with_scope("openid")
                .with_scope("profile")
                .with_scope("offline_access")
                .with_offline_access()],
            vec![ApiResource::new("web-api", "Web API").with_scope("WebAPI")],
            vec![IdentityResource::openid(), IdentityResource::profile()],
        )
    }

    pub fn find_client(&self, client_id: &str) -> Option<&ClientRegistration> {
        self.clients.iter().find(|c| c.client_id == client_id)
    }

    pub fn api_resources(&self) -> &[ApiResource] {
        &self.api_resources
    }

    pub fn identity_resources(&self) -> &[IdentityResource] {
        &self.identity_resources
    }

    /// Whether a scope is defined by any API or identity resource.
    /// `offline_access` is a protocol scope, always known.
    pub fn knows_scope(&self, scope: &str) -> bool {
        scope == "offline_access"
            || self
                .api_resources
                .iter()
                .any(|r| r.scopes.iter().any(|s| s == scope))
            || self.identity_resources.iter().any(|r| r.name == scope)
    }

    /// All scope names the registry defines.
    pub fn all_scopes(&self) -> Vec<String> {
        let mut scopes: Vec<String> = self
            .identity_resources
            .iter()
            .map(|r| r.name.clone())
            .collect();
        for api in &self.api_resources {
            for s in &api.scopes {
                if !scopes.contains(s) {
                    scopes.push(s.clone());
                }
            }
        }
        scopes.push("offline_access".to_string());
        scopes
    }

    /// Check a requested scope set against both the client's allow-list and
    /// the resource registry. Returns the first offending scope on failure.
    pub fn check_scopes<'a>(
        &self,
        client: &ClientRegistration,
        requested: &'a [String],
    ) -> std::result::Result<(), &'a str> {
        for scope in requested {
            if !client.allowed_scopes.iter().any(|s| s == scope) {
                return Err(scope);
            }
            if !self.knows_scope(scope) {
                return Err(scope);
            }
        }
        Ok(())
    }
}
