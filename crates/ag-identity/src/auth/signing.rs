//! Ephemeral signing key material.
//!
//! A fresh RSA key pair is generated at process start and never persisted:
//! every restart invalidates all outstanding tokens. Suitable for
//! development only, and logged as such at startup.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rsa::{
    pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding},
    traits::PublicKeyParts,
    RsaPrivateKey, RsaPublicKey,
};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::shared::error::{GatewayError, Result};

/// RSA public key components for JWKS, base64url encoded without padding.
#[derive(Debug, Clone)]
pub struct JwkComponents {
    /// Modulus (n)
    pub n: String,
    /// Exponent (e)
    pub e: String,
}

/// Process-lifetime signing credential.
pub struct SigningKeys {
    private_pem: String,
    public_pem: String,
    key_id: String,
    jwk: JwkComponents,
}

impl SigningKeys {
    /// Generate a fresh 2048-bit RSA key pair.
    pub fn generate_ephemeral() -> Result<Self> {
        info!("Generating ephemeral RSA signing key (2048 bit)");
        warn!("Signing key is not persisted; issued tokens become invalid on restart");

        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).map_err(|e| GatewayError::Internal {
            message: format!("Failed to generate RSA key: {}", e),
        })?;
        let public_key = RsaPublicKey::from(&private_key);

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| GatewayError::Internal {
                message: format!("Failed to encode private key: {}", e),
            })?
            .to_string();

        let public_pem = public_key
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| GatewayError::Internal {
                message: format!("Failed to encode public key: {}", e),
            })?;

        let key_id = Self::derive_key_id(&public_pem);
        let jwk = JwkComponents {
            n: URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
        };

        info!(key_id = %key_id, "Signing key ready");

        Ok(Self {
            private_pem,
            public_pem,
            key_id,
            jwk,
        })
    }

    /// Short key ID derived from the public key (first 6 bytes of SHA-256).
    fn derive_key_id(public_pem: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(public_pem.as_bytes());
        let hash = hasher.finalize();
        URL_SAFE_NO_PAD.encode(&hash[..6])
    }

    pub fn private_pem(&self) -> &str {
        &self.private_pem
    }

    pub fn public_pem(&self) -> &str {
        &self.public_pem
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn jwk_components(&self) -> &JwkComponents {
        &self.jwk
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_pem_encoded() {
        let keys = SigningKeys::generate_ephemeral().unwrap();
        assert!(keys.private_pem().contains("BEGIN PRIVATE KEY"));
        assert!(keys.public_pem().contains("BEGIN PUBLIC KEY"));
        assert!(!keys.key_id().is_empty());
        assert!(!keys.jwk_components().n.is_empty());
        // RSA public exponent 65537 encodes as AQAB
        assert_eq!(keys.jwk_components().e, "AQAB");
    }

    #[test]
    fn each_generation_yields_distinct_material() {
        let a = SigningKeys::generate_ephemeral().unwrap();
        let b = SigningKeys::generate_ephemeral().unwrap();
        assert_ne!(a.key_id(), b.key_id());
        assert_ne!(a.public_pem(), b.public_pem());
    }
}
