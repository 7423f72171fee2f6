//! Authentication and authorization utilities
//!
//! Provides:
//! - JWT token generation and validation
//! - User context extraction
//!
//! The orchestration core never validates credentials itself; it consumes
//! the resolved user id from the extracted context.

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use std::sync::Arc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Extracted authentication context available to handlers
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// Resolved user (owner) identity
    pub user_id: Uuid,

    /// Role claim ("student", "professor")
    pub role: String,

    /// Request ID for tracing
    pub request_id: String,
}

impl AuthContext {
    /// Require the professor role, returning error if not present
    pub fn require_professor(&self) -> Result<()> {
        if self.role == "professor" {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                message: "Professor role required".to_string(),
            })
        }
    }
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Role
    #[serde(default)]
    pub role: String,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token
    pub fn generate_token(&self, user_id: Uuid, role: &str) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            sub: user_id.to_string(),
            role: role.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| AppError::Internal {
            message: format!("Failed to generate token: {}", e),
        })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::ExpiredToken,
                _ => AppError::Unauthorized {
                    message: "Invalid token".to_string(),
                },
            })
    }
}

/// Hash a token for audit storage
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract a bearer token from an Authorization header value
pub fn extract_bearer(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ")
}

/// Axum extractor for AuthContext.
///
/// Verifies the bearer token signature against the configured JWT secret;
/// requests without a valid signature are rejected before any handler runs.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
    Arc<AppConfig>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let config = Arc::<AppConfig>::from_ref(state);

        // Extract request ID
        let request_id = parts
            .headers
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::Unauthorized {
                message: "Missing Authorization header".to_string(),
            })?;

        let token = extract_bearer(auth_header).ok_or_else(|| AppError::Unauthorized {
            message: "Authorization header is not a bearer token".to_string(),
        })?;

        let secret =
            config
                .auth
                .jwt_secret
                .as_deref()
                .ok_or_else(|| AppError::Configuration {
                    message: "auth.jwt_secret is not configured".to_string(),
                })?;

        let manager = JwtManager::new(secret, config.auth.jwt_expiration_secs);
        let claims = manager.validate_token(token)?;

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized {
            message: "Token subject is not a valid user id".to_string(),
        })?;

        tracing::debug!(
            request_id = %request_id,
            user_id = %user_id,
            token_hash = %hash_token(token),
            "Authenticated request"
        );

        Ok(AuthContext {
            user_id,
            role: claims.role,
            request_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600);

        let user_id = Uuid::new_v4();
        let token = manager.generate_token(user_id, "student").unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.role, "student");
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let manager = JwtManager::new("secret_a", 3600);
        let other = JwtManager::new("secret_b", 3600);

        let token = manager.generate_token(Uuid::new_v4(), "student").unwrap();
        assert!(other.validate_token(&token).is_err());
    }

    #[test]
    fn test_extract_bearer() {
        assert_eq!(extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(extract_bearer("abc"), None);
        assert_eq!(extract_bearer("Basic abc"), None);
    }

    #[test]
    fn test_require_professor() {
        let ctx = AuthContext {
            user_id: Uuid::new_v4(),
            role: "student".to_string(),
            request_id: "r1".to_string(),
        };
        assert!(ctx.require_professor().is_err());
    }

    #[test]
    fn test_hash_token_is_stable() {
        assert_eq!(hash_token("tok"), hash_token("tok"));
        assert_ne!(hash_token("tok"), hash_token("tok2"));
    }

    fn config_with_secret(secret: Option<&str>) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = secret.map(String::from);
        Arc::new(config)
    }

    fn parts_with_token(token: &str) -> Parts {
        axum::http::Request::builder()
            .header("authorization", format!("Bearer {token}"))
            .body(())
            .unwrap()
            .into_parts()
            .0
    }

    #[tokio::test]
    async fn test_extractor_accepts_signed_token() {
        let config = config_with_secret(Some("extractor_secret"));
        let manager = JwtManager::new("extractor_secret", 3600);
        let user_id = Uuid::new_v4();
        let token = manager.generate_token(user_id, "professor").unwrap();

        let mut parts = parts_with_token(&token);
        let ctx = AuthContext::from_request_parts(&mut parts, &config)
            .await
            .unwrap();

        assert_eq!(ctx.user_id, user_id);
        assert!(ctx.require_professor().is_ok());
    }

    #[tokio::test]
    async fn test_extractor_rejects_token_signed_with_other_secret() {
        let config = config_with_secret(Some("real_secret"));
        let forger = JwtManager::new("attacker_secret", 3600);
        let token = forger.generate_token(Uuid::new_v4(), "professor").unwrap();

        let mut parts = parts_with_token(&token);
        let err = AuthContext::from_request_parts(&mut parts, &config)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized { .. }));
    }

    #[tokio::test]
    async fn test_extractor_requires_configured_secret() {
        let config = config_with_secret(None);
        let manager = JwtManager::new("whatever", 3600);
        let token = manager.generate_token(Uuid::new_v4(), "student").unwrap();

        let mut parts = parts_with_token(&token);
        let err = AuthContext::from_request_parts(&mut parts, &config)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Configuration { .. }));
    }
}
