//! Token Service
//!
//! Mints and validates RS256 access tokens signed with the process's
//! ephemeral key. Claims for user-context tokens are taken from the
//! persisted account's roles at issuance time; a signed token is never
//! mutated afterwards.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::signing::SigningKeys;
use crate::shared::error::{GatewayError, Result};

/// JWT claims carried by every issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject: account ID for user tokens, client ID for machine tokens
    pub sub: String,

    /// Issuer (the authority URL)
    pub iss: String,

    /// Audience
    pub aud: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Not before (Unix timestamp)
    pub nbf: i64,

    /// JWT ID (unique per token)
    pub jti: String,

    /// Requesting OAuth client
    pub client_id: String,

    /// Granted scopes, space-delimited
    pub scope: String,

    /// Role names resolved from the identity store at issuance
    #[serde(default)]
    pub roles: Vec<String>,

    /// Email (user-context tokens only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl AccessTokenClaims {
    /// Granted scopes as individual values.
    pub fn scopes(&self) -> impl Iterator<Item = &str> {
        self.scope.split_whitespace()
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes().any(|s| s == scope)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Token configuration shared by issuance and validation.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Issuer URL placed in (and required of) every token
    pub issuer: String,
    /// Audience placed in (and required of) every token
    pub audience: String,
}

/// Signs and validates access tokens.
pub struct TokenService {
    config: TokenConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    key_id: String,
}

impl TokenService {
    pub fn new(config: TokenConfig, keys: &SigningKeys) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(keys.private_pem().as_bytes()).map_err(
            |e| GatewayError::Internal {
                message: format!("Invalid RSA private key: {}", e),
            },
        )?;

        let decoding_key = DecodingKey::from_rsa_pem(keys.public_pem().as_bytes()).map_err(
            |e| GatewayError::Internal {
                message: format!("Invalid RSA public key: {}", e),
            },
        )?;

        Ok(Self {
            config,
            encoding_key,
            decoding_key,
            key_id: keys.key_id().to_string(),
        })
    }

    /// Sign an access token for the given subject.
    ///
    /// `roles` must come from the identity store at the moment of issuance;
    /// the resulting token is immutable.
    pub fn issue(
        &self,
        subject: &str,
        client_id: &str,
        scopes: &[String],
        roles: Vec<String>,
        email: Option<String>,
        lifetime_secs: i64,
    ) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(lifetime_secs);

        let claims = AccessTokenClaims {
            sub: subject.to_string(),
            iss: self.config.issuer.clone(),
            aud: self.config.audience.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            nbf: now.timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            scope: scopes.join(" "),
            roles,
            email,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(self.key_id.clone());

        encode(&header, &claims, &self.encoding_key).map_err(|e| GatewayError::Internal {
            message: format!("Failed to encode JWT: {}", e),
        })
    }

    /// Validate a token's signature, issuer, audience, and expiry.
    pub fn validate(&self, token: &str) -> Result<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => GatewayError::TokenExpired,
                _ => GatewayError::InvalidToken {
                    message: format!("{}", e),
                },
            })
    }

    pub fn issuer(&self) -> &str {
        &self.config.issuer
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Extract bearer token from an Authorization header value.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}
