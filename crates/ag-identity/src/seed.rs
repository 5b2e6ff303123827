//! Startup data seeding.
//!
//! Ensures the built-in roles exist on every start. In dev mode a default
//! administrator account is created so a fresh database is immediately
//! usable.

use tracing::info;

use crate::account::service::IdentityService;
use crate::authz::{ROLE_ADMINISTRATOR, ROLE_USER};
use crate::shared::error::Result;

pub const DEV_ADMIN_EMAIL: &str = "admin@authgate.local";
pub const DEV_ADMIN_PASSWORD: &str = "Admin01*";

/// Ensure roles (and, in dev mode, the default administrator) exist.
pub async fn seed(identity: &IdentityService, dev_mode: bool) -> Result<()> {
    identity
        .roles()
        .ensure_exists(ROLE_ADMINISTRATOR, Some("Full account management".to_string()))
        .await?;
    identity
        .roles()
        .ensure_exists(ROLE_USER, Some("Standard user".to_string()))
        .await?;

    if dev_mode && identity.accounts().find_by_email(DEV_ADMIN_EMAIL).await?.is_none() {
        let (account, _) = identity
            .register(DEV_ADMIN_EMAIL, DEV_ADMIN_PASSWORD, None, None, None)
            .await?;
        identity.add_role(&account.id, ROLE_ADMINISTRATOR).await?;
        identity.accounts().set_email_confirmed(&account.id).await?;
        info!(email = DEV_ADMIN_EMAIL, "Dev administrator seeded");
    }

    Ok(())
}
