//! Claims-based authorization.
//!
//! A policy is a named predicate over the claim set of an authenticated
//! principal. Policies never run for unauthenticated requests; a missing
//! or invalid token fails with 401 before evaluation, an unsatisfied
//! policy fails with 403.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::token_service::AccessTokenClaims;
use crate::shared::error::{GatewayError, Result};

/// Claim type for role assertions.
pub const ROLE_CLAIM: &str = "role";

/// Claim type for granted scopes.
pub const SCOPE_CLAIM: &str = "scope";

/// Role name granted full account-management rights.
pub const ROLE_ADMINISTRATOR: &str = "administrator";

/// Role name for ordinary users.
pub const ROLE_USER: &str = "user";

/// Policy guarding account-management endpoints (administrator only).
pub const POLICY_MANAGE_ACCOUNTS: &str = "manage-accounts";

/// Policy guarding resource endpoints (user or administrator).
pub const POLICY_ACCESS_RESOURCES: &str = "access-resources";

/// A typed assertion attached to an authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Claim {
    pub claim_type: String,
    pub value: String,
}

impl Claim {
    pub fn new(claim_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            claim_type: claim_type.into(),
            value: value.into(),
        }
    }

    pub fn role(value: impl Into<String>) -> Self {
        Self::new(ROLE_CLAIM, value)
    }

    pub fn matches(&self, claim_type: &str, value: &str) -> bool {
        self.claim_type == claim_type && self.value == value
    }
}

/// Authorization context for a validated request.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Subject (account ID or client ID)
    pub subject: String,

    /// OAuth client the token was issued to
    pub client_id: String,

    /// Email, when the token carries a user context
    pub email: Option<String>,

    /// Claims derived from the token at validation time
    pub claims: Vec<Claim>,
}

impl AuthContext {
    /// Build the claim set from validated token claims.
    pub fn from_token(claims: &AccessTokenClaims) -> Self {
        let mut set: Vec<Claim> = claims
            .roles
            .iter()
            .map(|r| Claim::role(r.clone()))
            .collect();
        set.extend(claims.scopes().map(|s| Claim::new(SCOPE_CLAIM, s)));

        Self {
            subject: claims.sub.clone(),
            client_id: claims.client_id.clone(),
            email: claims.email.clone(),
            claims: set,
        }
    }

    pub fn has_claim(&self, claim_type: &str, value: &str) -> bool {
        self.claims.iter().any(|c| c.matches(claim_type, value))
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.has_claim(ROLE_CLAIM, role)
    }
}

/// A named predicate over a principal's claim set.
type PolicyPredicate = dyn Fn(&[Claim]) -> bool + Send + Sync;

/// Registry of named authorization policies, read-only after startup.
#[derive(Clone)]
pub struct PolicyRegistry {
    policies: Arc<HashMap<String, Box<PolicyPredicate>>>,
}

impl PolicyRegistry {
    /// Build the registry with the gateway's standard policies:
    ///
    /// - `manage-accounts`: requires the administrator role claim;
    /// - `access-resources`: satisfied by the user OR administrator role,
    ///   evaluated as a predicate over the whole claim set.
    pub fn with_default_policies() -> Self {
        let mut policies: HashMap<String, Box<PolicyPredicate>> = HashMap::new();

        policies.insert(
            POLICY_MANAGE_ACCOUNTS.to_string(),
            Box::new(|claims: &[Claim]| {
                claims
                    .iter()
                    .any(|c| c.matches(ROLE_CLAIM, ROLE_ADMINISTRATOR))
            }),
        );

        policies.insert(
            POLICY_ACCESS_RESOURCES.to_string(),
            Box::new(|claims: &[Claim]| {
                claims.iter().any(|c| {
                    c.matches(ROLE_CLAIM, ROLE_USER) || c.matches(ROLE_CLAIM, ROLE_ADMINISTRATOR)
                })
            }),
        );

        Self {
            policies: Arc::new(policies),
        }
    }

    /// Evaluate a named policy against a context.
    ///
    /// Unknown policy names are an internal error, not a denial.
    pub fn authorize(&self, policy_name: &str, context: &AuthContext) -> Result<()> {
        let predicate = self.policies.get(policy_name).ok_or_else(|| {
            GatewayError::internal(format!("Unknown authorization policy: {}", policy_name))
        })?;

        if predicate(&context.claims) {
            Ok(())
        } else {
            Err(GatewayError::forbidden(format!(
                "Policy not satisfied: {}",
                policy_name
            )))
        }
    }

    pub fn contains(&self, policy_name: &str) -> bool {
        self.policies.contains_key(policy_name)
    }
}
