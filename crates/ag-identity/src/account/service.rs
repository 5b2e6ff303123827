//! Identity Service
//!
//! Orchestrates account lifecycle on top of the repositories: registration
//! under the password policy, credential verification with lockout,
//! role assignment, and single-use confirmation/reset tokens.

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::account::entity::{IdentityToken, TokenPurpose, UserAccount};
use crate::account::repository::AccountRepository;
use crate::auth::password::PasswordHasher;
use crate::authz::ROLE_USER;
use crate::role::repository::RoleRepository;
use crate::shared::error::{GatewayError, Result};

/// Behavioral knobs for the identity service.
#[derive(Debug, Clone)]
pub struct IdentityOptions {
    /// Failed attempts before a lockout window starts
    pub max_failed_attempts: i64,
    /// Lockout window length, seconds
    pub lockout_secs: i64,
    /// Lifetime of confirmation and reset tokens, seconds
    pub identity_token_ttl_secs: i64,
}

impl Default for IdentityOptions {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_secs: 300,
            identity_token_ttl_secs: 86400,
        }
    }
}

#[derive(Clone)]
pub struct IdentityService {
    accounts: AccountRepository,
    roles: RoleRepository,
    hasher: PasswordHasher,
    options: IdentityOptions,
}

impl IdentityService {
    pub fn new(
        accounts: AccountRepository,
        roles: RoleRepository,
        hasher: PasswordHasher,
        options: IdentityOptions,
    ) -> Self {
        Self {
            accounts,
            roles,
            hasher,
            options,
        }
    }

    pub fn accounts(&self) -> &AccountRepository {
        &self.accounts
    }

    pub fn roles(&self) -> &RoleRepository {
        &self.roles
    }

    /// Register a new account.
    ///
    /// The password must satisfy the policy. New accounts get the `user`
    /// role and an email confirmation token, returned alongside the
    /// account for delivery.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        given_name: Option<String>,
        family_name: Option<String>,
        phone_number: Option<String>,
    ) -> Result<(UserAccount, String)> {
        let email = email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(GatewayError::validation("A valid email address is required"));
        }

        let password_hash = self.hasher.hash_password(password)?;

        let mut account = UserAccount::new(email, password_hash);
        account.given_name = given_name;
        account.family_name = family_name;
        account.phone_number = phone_number;
        self.accounts.insert(&account).await?;

        let user_role = self.roles.ensure_exists(ROLE_USER, None).await?;
        self.accounts.assign_role(&account.id, &user_role.id).await?;

        let (token, secret) = IdentityToken::issue(
            &account.id,
            TokenPurpose::EmailConfirmation,
            self.options.identity_token_ttl_secs,
        );
        self.accounts.insert_identity_token(&token).await?;

        info!(account_id = %account.id, "Account registered");
        Ok((account, secret))
    }

    /// Verify an email/password pair.
    ///
    /// Failures are uniform `InvalidCredentials` regardless of whether the
    /// account exists. Locked or deactivated accounts never verify, even
    /// with the right password.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<UserAccount> {
        let email = email.trim().to_lowercase();
        let account = match self.accounts.find_by_email(&email).await? {
            Some(account) => account,
            None => {
                // Burn a hash anyway so timing does not reveal existence
                let _ = self.hasher.verify_password(password, DUMMY_HASH);
                return Err(GatewayError::InvalidCredentials);
            }
        };

        if let Some(until) = account.lockout_until {
            if account.is_locked_out() {
                warn!(account_id = %account.id, "Login attempt on locked account");
                return Err(GatewayError::LockedOut { until });
            }
        }

        if !account.active {
            return Err(GatewayError::InvalidCredentials);
        }

        if self.hasher.verify_password(password, &account.password_hash)? {
            self.accounts.record_successful_login(&account.id).await?;
            Ok(account)
        } else {
            let lockout_until = Utc::now() + Duration::seconds(self.options.lockout_secs);
            let count = self
                .accounts
                .record_failed_login(&account.id, self.options.max_failed_attempts, lockout_until)
                .await?;
            if count >= self.options.max_failed_attempts {
                warn!(account_id = %account.id, "Account locked after repeated failures");
            }
            Err(GatewayError::InvalidCredentials)
        }
    }

    pub async fn add_role(&self, account_id: &str, role_name: &str) -> Result<()> {
        let account = self.accounts.get_by_id(account_id).await?;
        let role = self
            .roles
            .find_by_name(role_name)
            .await?
            .ok_or_else(|| GatewayError::not_found("Role", role_name))?;
        self.accounts.assign_role(&account.id, &role.id).await?;
        info!(account_id = %account.id, role = %role.name, "Role assigned");
        Ok(())
    }

    pub async fn remove_role(&self, account_id: &str, role_name: &str) -> Result<()> {
        let account = self.accounts.get_by_id(account_id).await?;
        let role = self
            .roles
            .find_by_name(role_name)
            .await?
            .ok_or_else(|| GatewayError::not_found("Role", role_name))?;
        self.accounts.remove_role(&account.id, &role.id).await?;
        info!(account_id = %account.id, role = %role.name, "Role removed");
        Ok(())
    }

    /// Consume an email confirmation token.
    pub async fn confirm_email(&self, secret: &str) -> Result<()> {
        let token = self
            .lookup_usable_token(secret, TokenPurpose::EmailConfirmation)
            .await?;
        if !self.accounts.consume_identity_token(&token.id).await? {
            return Err(GatewayError::InvalidToken {
                message: "Token already used".to_string(),
            });
        }
        self.accounts.set_email_confirmed(&token.account_id).await?;
        info!(account_id = %token.account_id, "Email confirmed");
        Ok(())
    }

    /// Issue a password reset token for the account, when it exists.
    ///
    /// Returns None for unknown emails so callers can respond identically
    /// either way.
    pub async fn issue_password_reset_token(&self, email: &str) -> Result<Option<String>> {
        let email = email.trim().to_lowercase();
        let Some(account) = self.accounts.find_by_email(&email).await? else {
            return Ok(None);
        };

        let (token, secret) = IdentityToken::issue(
            &account.id,
            TokenPurpose::PasswordReset,
            self.options.identity_token_ttl_secs,
        );
        self.accounts.insert_identity_token(&token).await?;
        info!(account_id = %account.id, "Password reset token issued");
        Ok(Some(secret))
    }

    /// Consume a reset token and set a new password. Clears any lockout.
    pub async fn reset_password(&self, secret: &str, new_password: &str) -> Result<()> {
        let token = self
            .lookup_usable_token(secret, TokenPurpose::PasswordReset)
            .await?;

        let password_hash = self.hasher.hash_password(new_password)?;

        if !self.accounts.consume_identity_token(&token.id).await? {
            return Err(GatewayError::InvalidToken {
                message: "Token already used".to_string(),
            });
        }
        self.accounts
            .set_password_hash(&token.account_id, &password_hash)
            .await?;
        self.accounts.record_successful_login(&token.account_id).await?;
        info!(account_id = %token.account_id, "Password reset");
        Ok(())
    }

    /// Change a password given the current one.
    pub async fn change_password(
        &self,
        account_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<()> {
        let account = self.accounts.get_by_id(account_id).await?;
        if !self
            .hasher
            .verify_password(current_password, &account.password_hash)?
        {
            return Err(GatewayError::InvalidCredentials);
        }

        let password_hash = self.hasher.hash_password(new_password)?;
        self.accounts.set_password_hash(&account.id, &password_hash).await?;
        info!(account_id = %account.id, "Password changed");
        Ok(())
    }

    pub async fn deactivate(&self, account_id: &str) -> Result<()> {
        self.accounts.set_active(account_id, false).await?;
        info!(account_id = %account_id, "Account deactivated");
        Ok(())
    }

    async fn lookup_usable_token(
        &self,
        secret: &str,
        purpose: TokenPurpose,
    ) -> Result<IdentityToken> {
        let hash = IdentityToken::hash_secret(secret);
        let token = self
            .accounts
            .find_identity_token(&hash, purpose.as_str())
            .await?
            .ok_or_else(|| GatewayError::InvalidToken {
                message: "Unknown token".to_string(),
            })?;

        if !token.is_usable() {
            return Err(GatewayError::InvalidToken {
                message: "Token expired or already used".to_string(),
            });
        }
        Ok(token)
    }
}

// Argon2id hash of a throwaway value, verified on unknown-account logins.
const DUMMY_HASH: &str = "$argon2id$v=19$m=19456,t=2,p=1$YWJjZGVmZ2hpamts$Z1FOTmK1Ho+2ZXx4rP9Yl3ROoiC9dQ4vYPRZyUxyB1M";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::repository::init_schema;
    use crate::auth::password::PasswordPolicy;
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn service_with(pool: SqlitePool, options: IdentityOptions) -> IdentityService {
        IdentityService::new(
            AccountRepository::new(pool.clone()),
            RoleRepository::new(pool),
            PasswordHasher::new(PasswordPolicy::default()),
            options,
        )
    }

    async fn test_service() -> IdentityService {
        service_with(test_pool().await, IdentityOptions::default())
    }

    #[tokio::test]
    async fn register_enforces_the_password_policy() {
        let service = test_service().await;

        let err = service
            .register("user@example.com", "short", None, None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));

        // Valid: 8+ chars, digit, uppercase. Lowercase and specials optional.
        let (account, _) = service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();
        assert_eq!(account.email, "user@example.com");
    }

    #[tokio::test]
    async fn new_accounts_get_the_user_role() {
        let service = test_service().await;
        let (account, _) = service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let roles = service.accounts().roles_for_account(&account.id).await.unwrap();
        assert_eq!(roles, vec!["user"]);
    }

    #[tokio::test]
    async fn verify_rejects_unknown_accounts_uniformly() {
        let service = test_service().await;
        let err = service
            .verify_credentials("ghost@example.com", "Passw0rdd")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCredentials));
    }

    #[tokio::test]
    async fn verify_accepts_the_registered_password() {
        let service = test_service().await;
        service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        let account = service
            .verify_credentials("user@example.com", "Passw0rdd")
            .await
            .unwrap();
        assert_eq!(account.email, "user@example.com");

        let err = service
            .verify_credentials("user@example.com", "WrongPass1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCredentials));
    }

    #[tokio::test]
    async fn repeated_failures_lock_the_account() {
        let pool = test_pool().await;
        let service = service_with(
            pool,
            IdentityOptions {
                max_failed_attempts: 2,
                lockout_secs: 300,
                identity_token_ttl_secs: 3600,
            },
        );
        service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        for _ in 0..2 {
            let err = service
                .verify_credentials("user@example.com", "WrongPass1")
                .await
                .unwrap_err();
            assert!(matches!(err, GatewayError::InvalidCredentials));
        }

        // Correct password is now refused with the lockout error
        let err = service
            .verify_credentials("user@example.com", "Passw0rdd")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::LockedOut { .. }));
    }

    #[tokio::test]
    async fn email_confirmation_is_single_use() {
        let service = test_service().await;
        let (account, secret) = service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        service.confirm_email(&secret).await.unwrap();
        let stored = service.accounts().get_by_id(&account.id).await.unwrap();
        assert!(stored.email_confirmed);

        let err = service.confirm_email(&secret).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn password_reset_flow() {
        let service = test_service().await;
        service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        assert!(service
            .issue_password_reset_token("ghost@example.com")
            .await
            .unwrap()
            .is_none());

        let secret = service
            .issue_password_reset_token("user@example.com")
            .await
            .unwrap()
            .unwrap();

        // New password still goes through the policy
        let err = service.reset_password(&secret, "weak").await.unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));

        service.reset_password(&secret, "NewPassw0rd").await.unwrap();
        service
            .verify_credentials("user@example.com", "NewPassw0rd")
            .await
            .unwrap();

        let err = service
            .reset_password(&secret, "OtherPass1")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidToken { .. }));
    }

    #[tokio::test]
    async fn deactivated_accounts_cannot_log_in() {
        let service = test_service().await;
        let (account, _) = service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();

        service.deactivate(&account.id).await.unwrap();
        let err = service
            .verify_credentials("user@example.com", "Passw0rdd")
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCredentials));
    }

    #[tokio::test]
    async fn role_assignment_by_name() {
        let service = test_service().await;
        let (account, _) = service
            .register("user@example.com", "Passw0rdd", None, None, None)
            .await
            .unwrap();
        service
            .roles()
            .ensure_exists("administrator", None)
            .await
            .unwrap();

        service.add_role(&account.id, "administrator").await.unwrap();
        let roles = service.accounts().roles_for_account(&account.id).await.unwrap();
        assert_eq!(roles, vec!["administrator", "user"]);

        service.remove_role(&account.id, "administrator").await.unwrap();
        let roles = service.accounts().roles_for_account(&account.id).await.unwrap();
        assert_eq!(roles, vec!["user"]);

        let err = service.add_role(&account.id, "ghost-role").await.unwrap_err();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }
}
