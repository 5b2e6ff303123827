//! Account Repository
//!
//! SQLite-backed storage for user accounts, role membership, and
//! single-use identity tokens. The schema is bootstrapped with
//! `CREATE TABLE IF NOT EXISTS` at startup.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::account::entity::{IdentityToken, UserAccount};
use crate::shared::error::{GatewayError, Result};

/// Create the identity schema when missing.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            given_name TEXT,
            family_name TEXT,
            phone_number TEXT,
            email_confirmed INTEGER NOT NULL DEFAULT 0,
            failed_login_count INTEGER NOT NULL DEFAULT 0,
            lockout_until TEXT,
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS roles (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS account_roles (
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
            assigned_at TEXT NOT NULL,
            PRIMARY KEY (account_id, role_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS identity_tokens (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
            token_hash TEXT NOT NULL UNIQUE,
            purpose TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            consumed_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Identity schema ready");
    Ok(())
}

const ACCOUNT_COLUMNS: &str = "id, email, password_hash, given_name, family_name, phone_number, \
     email_confirmed, failed_login_count, lockout_until, active, created_at, updated_at";

#[derive(Clone)]
pub struct AccountRepository {
    pool: SqlitePool,
}

impl AccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, account: &UserAccount) -> Result<()> {
        if self.find_by_email(&account.email).await?.is_some() {
            return Err(GatewayError::duplicate("UserAccount", "email", &account.email));
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, password_hash, given_name, family_name, phone_number,
                email_confirmed, failed_login_count, lockout_until, active, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.given_name)
        .bind(&account.family_name)
        .bind(&account.phone_number)
        .bind(account.email_confirmed)
        .bind(account.failed_login_count)
        .bind(account.lockout_until)
        .bind(account.active)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        debug!(account_id = %account.id, "Account created");
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<UserAccount>> {
        let account = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = ?"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(account)
    }

    pub async fn get_by_id(&self, id: &str) -> Result<UserAccount> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| GatewayError::not_found("UserAccount", id))
    }

    pub async fn list(&self) -> Result<Vec<UserAccount>> {
        let accounts = sqlx::query_as::<_, UserAccount>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    pub async fn set_password_hash(&self, id: &str, password_hash: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET password_hash = ?, updated_at = ? WHERE id = ?",
        )
        .bind(password_hash)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::not_found("UserAccount", id));
        }
        Ok(())
    }

    pub async fn set_email_confirmed(&self, id: &str) -> Result<()> {
        let result =
            sqlx::query("UPDATE accounts SET email_confirmed = 1, updated_at = ? WHERE id = ?")
                .bind(Utc::now())
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::not_found("UserAccount", id));
        }
        Ok(())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(GatewayError::not_found("UserAccount", id));
        }
        Ok(())
    }

    /// Record a failed login. Sets the lockout window when the attempt
    /// count reaches the configured maximum.
    pub async fn record_failed_login(
        &self,
        id: &str,
        max_failed_attempts: i64,
        lockout_until: DateTime<Utc>,
    ) -> Result<i64> {
        let account = self.get_by_id(id).await?;
        let count = account.failed_login_count + 1;

        if count >= max_failed_attempts {
            sqlx::query(
                "UPDATE accounts SET failed_login_count = ?, lockout_until = ?, updated_at = ? WHERE id = ?",
            )
            .bind(count)
            .bind(lockout_until)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        } else {
            sqlx::query(
                "UPDATE accounts SET failed_login_count = ?, updated_at = ? WHERE id = ?",
            )
            .bind(count)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        }

        Ok(count)
    }

    /// Clear the failure counter and any lockout after a successful login.
    pub async fn record_successful_login(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE accounts SET failed_login_count = 0, lockout_until = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // -- role membership --

    pub async fn assign_role(&self, account_id: &str, role_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO account_roles (account_id, role_id, assigned_at)
            VALUES (?, ?, ?)
            ON CONFLICT (account_id, role_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(role_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_role(&self, account_id: &str, role_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM account_roles WHERE account_id = ? AND role_id = ?")
            .bind(account_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Role names for an account, resolved at token-issuance time.
    pub async fn roles_for_account(&self, account_id: &str) -> Result<Vec<String>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.name FROM roles r
            JOIN account_roles ar ON ar.role_id = r.id
            WHERE ar.account_id = ?
            ORDER BY r.name
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names.into_iter().map(|(n,)| n).collect())
    }

    // -- identity tokens --

    pub async fn insert_identity_token(&self, token: &IdentityToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identity_tokens (id, account_id, token_hash, purpose,
                expires_at, consumed_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&token.id)
        .bind(&token.account_id)
        .bind(&token.token_hash)
        .bind(&token.purpose)
        .bind(token.expires_at)
        .bind(token.consumed_at)
        .bind(token.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_identity_token(
        &self,
        token_hash: &str,
        purpose: &str,
    ) -> Result<Option<IdentityToken>> {
        let token = sqlx::query_as::<_, IdentityToken>(
            r#"
            SELECT id, account_id, token_hash, purpose, expires_at, consumed_at, created_at
            FROM identity_tokens
            WHERE token_hash = ? AND purpose = ?
            "#,
        )
        .bind(token_hash)
        .bind(purpose)
        .fetch_optional(&self.pool)
        .await?;
        Ok(token)
    }

    /// Mark a token consumed. Single use is enforced by the guard on
    /// `consumed_at`; a second consumption affects zero rows.
    pub async fn consume_identity_token(&self, id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE identity_tokens SET consumed_at = ? WHERE id = ? AND consumed_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
