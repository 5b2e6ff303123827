//! Role Repository
//!
//! SQLite-backed storage for roles and role membership.

use sqlx::SqlitePool;
use tracing::debug;

use crate::role::entity::Role;
use crate::shared::error::{GatewayError, Result};

#[derive(Clone)]
pub struct RoleRepository {
    pool: SqlitePool,
}

impl RoleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, role: &Role) -> Result<()> {
        if self.find_by_name(&role.name).await?.is_some() {
            return Err(GatewayError::duplicate("Role", "name", &role.name));
        }

        sqlx::query(
            r#"
            INSERT INTO roles (id, name, description, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.created_at)
        .execute(&self.pool)
        .await?;

        debug!(role = %role.name, "Role created");
        Ok(())
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at FROM roles WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Role>> {
        let role = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at FROM roles WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }

    pub async fn list(&self) -> Result<Vec<Role>> {
        let roles = sqlx::query_as::<_, Role>(
            "SELECT id, name, description, created_at FROM roles ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    /// Insert the role when absent; returns the stored entity either way.
    pub async fn ensure_exists(&self, name: &str, description: Option<String>) -> Result<Role> {
        if let Some(existing) = self.find_by_name(name).await? {
            return Ok(existing);
        }
        let role = Role::new(name, description);
        self.insert(&role).await?;
        Ok(role)
    }
}
