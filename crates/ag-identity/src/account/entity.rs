//! Account entities

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

/// A user account in the identity store.
///
/// The password hash is an Argon2id PHC string and never leaves the store
/// in API responses.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserAccount {
    pub id: String,
    pub email: String,

    #[serde(skip_serializing)]
    pub password_hash: String,

    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone_number: Option<String>,

    pub email_confirmed: bool,

    /// Consecutive failed login attempts since the last success
    pub failed_login_count: i64,

    /// When set and in the future, credential checks are refused
    pub lockout_until: Option<DateTime<Utc>>,

    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(email: impl Into<String>, password_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            email: email.into(),
            password_hash: password_hash.into(),
            given_name: None,
            family_name: None,
            phone_number: None,
            email_confirmed: false,
            failed_login_count: 0,
            lockout_until: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_locked_out(&self) -> bool {
        self.lockout_until.is_some_and(|until| until > Utc::now())
    }

    /// Public view safe to return from API endpoints.
    pub fn to_view(&self, roles: Vec<String>) -> AccountView {
        AccountView {
            id: self.id.clone(),
            email: self.email.clone(),
            given_name: self.given_name.clone(),
            family_name: self.family_name.clone(),
            phone_number: self.phone_number.clone(),
            email_confirmed: self.email_confirmed,
            active: self.active,
            roles,
            created_at: self.created_at,
        }
    }
}

/// Account representation exposed over the API.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AccountView {
    pub id: String,
    pub email: String,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub phone_number: Option<String>,
    pub email_confirmed: bool,
    pub active: bool,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// What a single-use identity token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    EmailConfirmation,
    PasswordReset,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::EmailConfirmation => "email_confirmation",
            TokenPurpose::PasswordReset => "password_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "email_confirmation" => Some(TokenPurpose::EmailConfirmation),
            "password_reset" => Some(TokenPurpose::PasswordReset),
            _ => None,
        }
    }
}

/// A single-use token bound to an account (email confirmation, password
/// reset). Only the SHA-256 hash of the secret is stored; the plaintext
/// exists once, at issuance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct IdentityToken {
    pub id: String,
    pub account_id: String,
    pub token_hash: String,
    pub purpose: String,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl IdentityToken {
    /// Issue a new token. Returns the entity and the plaintext secret.
    pub fn issue(account_id: &str, purpose: TokenPurpose, ttl_secs: i64) -> (Self, String) {
        let mut secret_bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret_bytes);
        let secret = URL_SAFE_NO_PAD.encode(secret_bytes);

        let now = Utc::now();
        let entity = Self {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            token_hash: Self::hash_secret(&secret),
            purpose: purpose.as_str().to_string(),
            expires_at: now + Duration::seconds(ttl_secs),
            consumed_at: None,
            created_at: now,
        };
        (entity, secret)
    }

    pub fn hash_secret(secret: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    pub fn is_usable(&self) -> bool {
        self.consumed_at.is_none() && self.expires_at > Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accounts_start_unlocked_and_unconfirmed() {
        let account = UserAccount::new("user@example.com", "$argon2id$...");
        assert!(!account.is_locked_out());
        assert!(!account.email_confirmed);
        assert!(account.active);
        assert_eq!(account.failed_login_count, 0);
    }

    #[test]
    fn lockout_in_the_past_does_not_lock() {
        let mut account = UserAccount::new("user@example.com", "h");
        account.lockout_until = Some(Utc::now() - Duration::minutes(1));
        assert!(!account.is_locked_out());

        account.lockout_until = Some(Utc::now() + Duration::minutes(5));
        assert!(account.is_locked_out());
    }

    #[test]
    fn view_omits_the_password_hash() {
        let account = UserAccount::new("user@example.com", "secret-hash");
        let json = serde_json::to_string(&account).unwrap();
        assert!(!json.contains("secret-hash"));
    }

    #[test]
    fn issued_tokens_store_only_the_hash() {
        let (entity, secret) =
            IdentityToken::issue("acct-1", TokenPurpose::EmailConfirmation, 3600);
        assert_ne!(entity.token_hash, secret);
        assert_eq!(entity.token_hash, IdentityToken::hash_secret(&secret));
        assert!(entity.is_usable());
    }

    #[test]
    fn expired_or_consumed_tokens_are_unusable() {
        let (mut entity, _) = IdentityToken::issue("acct-1", TokenPurpose::PasswordReset, -1);
        assert!(!entity.is_usable());

        entity.expires_at = Utc::now() + Duration::hours(1);
        entity.consumed_at = Some(Utc::now());
        assert!(!entity.is_usable());
    }

    #[test]
    fn token_purpose_round_trips_through_storage_form() {
        assert_eq!(
            TokenPurpose::parse("email_confirmation"),
            Some(TokenPurpose::EmailConfirmation)
        );
        assert_eq!(
            TokenPurpose::parse("password_reset"),
            Some(TokenPurpose::PasswordReset)
        );
        assert_eq!(TokenPurpose::parse("other"), None);
    }
}
