//! Password policy and credential hashing.
//!
//! Hashing uses Argon2id; policy violations are reported as a single
//! validation error enumerating every unmet rule.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::warn;

use crate::shared::error::{GatewayError, Result};

/// Password policy configuration.
///
/// Defaults: minimum length 8, a digit and an uppercase letter required,
/// lowercase and non-alphanumeric characters not required.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub required_length: usize,
    pub require_digit: bool,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_non_alphanumeric: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            required_length: 8,
            require_digit: true,
            require_uppercase: true,
            require_lowercase: false,
            require_non_alphanumeric: false,
        }
    }
}

impl PasswordPolicy {
    /// Validate a password, collecting every unmet rule.
    pub fn validate(&self, password: &str) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if password.chars().count() < self.required_length {
            errors.push(format!(
                "Password must be at least {} characters",
                self.required_length
            ));
        }

        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push("Password must contain at least one digit".to_string());
        }

        if self.require_uppercase && !password.chars().any(|c| c.is_ascii_uppercase()) {
            errors.push("Password must contain at least one uppercase letter".to_string());
        }

        if self.require_lowercase && !password.chars().any(|c| c.is_ascii_lowercase()) {
            errors.push("Password must contain at least one lowercase letter".to_string());
        }

        if self.require_non_alphanumeric && password.chars().all(|c| c.is_ascii_alphanumeric()) {
            errors.push("Password must contain at least one non-alphanumeric character".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Argon2id password hasher with policy enforcement.
#[derive(Clone)]
pub struct PasswordHasher {
    argon2: Argon2<'static>,
    policy: PasswordPolicy,
}

impl PasswordHasher {
    pub fn new(policy: PasswordPolicy) -> Self {
        Self {
            argon2: Argon2::default(),
            policy,
        }
    }

    /// Validate against the policy, then hash with a fresh random salt.
    pub fn hash_password(&self, password: &str) -> Result<String> {
        self.validate(password)?;

        let salt = SaltString::generate(&mut OsRng);
        let hash = argon2::PasswordHasher::hash_password(&self.argon2, password.as_bytes(), &salt)
            .map_err(|e| GatewayError::Internal {
                message: format!("Failed to hash password: {}", e),
            })?;

        Ok(hash.to_string())
    }

    /// Verify a password against a stored PHC hash string.
    pub fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash).map_err(|e| GatewayError::Internal {
            message: format!("Invalid password hash format: {}", e),
        })?;

        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => {
                warn!("Password verification failed: incorrect password");
                Ok(false)
            }
            Err(e) => Err(GatewayError::Internal {
                message: format!("Password verification error: {}", e),
            }),
        }
    }

    /// Validate against the policy without hashing.
    pub fn validate(&self, password: &str) -> Result<()> {
        self.policy.validate(password).map_err(|errors| {
            GatewayError::Validation {
                message: errors.join("; "),
            }
        })
    }

    pub fn policy(&self) -> &PasswordPolicy {
        &self.policy
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(PasswordPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_accepts_compliant_password() {
        let policy = PasswordPolicy::default();
        // Digit + uppercase + length 8; no lowercase or symbol needed
        assert!(policy.validate("PASSW0RD").is_ok());
        assert!(policy.validate("Passw0rd").is_ok());
    }

    #[test]
    fn default_policy_rejects_each_missing_rule() {
        let policy = PasswordPolicy::default();

        // Too short
        assert!(policy.validate("Ab1").is_err());
        // No digit
        assert!(policy.validate("Password").is_err());
        // No uppercase
        assert!(policy.validate("password1").is_err());
    }

    #[test]
    fn violations_enumerate_all_unmet_rules() {
        let policy = PasswordPolicy::default();
        let errors = policy.validate("abc").unwrap_err();
        // Length, digit, and uppercase all unmet
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.contains("8 characters")));
        assert!(errors.iter().any(|e| e.contains("digit")));
        assert!(errors.iter().any(|e| e.contains("uppercase")));
    }

    #[test]
    fn lowercase_and_symbols_are_not_required() {
        let policy = PasswordPolicy::default();
        assert!(policy.validate("UPPER123").is_ok());
    }

    #[test]
    fn hash_and_verify_roundtrip() {
        let hasher = PasswordHasher::default();
        let hash = hasher.hash_password("Sup3rSecret").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(hasher.verify_password("Sup3rSecret", &hash).unwrap());
        assert!(!hasher.verify_password("WrongPass1", &hash).unwrap());
    }

    #[test]
    fn hashing_rejects_policy_violations() {
        let hasher = PasswordHasher::default();
        let err = hasher.hash_password("short").unwrap_err();
        assert!(matches!(err, GatewayError::Validation { .. }));
    }

    #[test]
    fn same_password_hashes_differently() {
        let hasher = PasswordHasher::default();
        let h1 = hasher.hash_password("Sup3rSecret").unwrap();
        let h2 = hasher.hash_password("Sup3rSecret").unwrap();
        assert_ne!(h1, h2);
    }
}
