//! Signed identity assertions (HS256 JWT).
//!
//! The verifier pins HS256 and never consults the token header to pick an
//! algorithm. Expiry is always required.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Identity;
use crate::config::ConfigError;
use crate::models::Role;
use crate::utils::error::AppError;

pub const TOKEN_TTL_HOURS: i64 = 24;
pub const MIN_SECRET_LEN: usize = 32;

const ALGORITHM: Algorithm = Algorithm::HS256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct ClaimIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl std::fmt::Debug for ClaimIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaimIssuer")
            .field("algorithm", &ALGORITHM)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl ClaimIssuer {
    pub fn new(secret: &str) -> Result<Self, ConfigError> {
        Self::with_ttl(secret, Duration::hours(TOKEN_TTL_HOURS))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} bytes"),
            });
        }

        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
        })
    }

    pub fn issue(&self, subject_id: Uuid, role: Role) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject_id,
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::new(ALGORITHM), &claims, &self.encoding)
            .map_err(|e| AppError::InternalServerError(format!("token signing failed: {e}")))
    }

    pub fn verify(&self, token: &str) -> Result<Identity, AppError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Token rejected");
            AppError::AuthError("invalid or expired token".to_string())
        })?;

        Ok(Identity {
            user_id: data.claims.sub,
            role: data.claims.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-that-is-long-enough-for-hs256";

    #[test]
    fn test_issue_then_verify() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        let user_id = Uuid::new_v4();

        let token = issuer.issue(user_id, Role::Organizer).unwrap();
        let identity = issuer.verify(&token).unwrap();

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.role, Role::Organizer);
    }

    #[test]
    fn test_short_secret_is_a_config_error() {
        assert!(matches!(
            ClaimIssuer::new("too-short"),
            Err(ConfigError::Invalid { key: "JWT_SECRET", .. })
        ));
    }

    #[test]
    fn test_token_from_other_secret_rejected() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        let other = ClaimIssuer::new("another-secret-that-is-also-long-enough").unwrap();

        let token = other.issue(Uuid::new_v4(), Role::Customer).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = ClaimIssuer::with_ttl(SECRET, Duration::seconds(-10)).unwrap();
        let token = issuer.issue(Uuid::new_v4(), Role::Customer).unwrap();
        assert!(matches!(issuer.verify(&token), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_other_hmac_algorithm_rejected() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4(),
            role: Role::Customer,
            iat: now.timestamp(),
            exp: (now + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(issuer.verify(&token), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_unknown_role_claim_rejected() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        let claims = serde_json::json!({
            "sub": Uuid::new_v4(),
            "role": "admin",
            "iat": Utc::now().timestamp(),
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(issuer.verify(&token), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_missing_subject_rejected() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        let claims = serde_json::json!({
            "role": "customer",
            "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        });
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert!(matches!(issuer.verify(&token), Err(AppError::AuthError(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        let issuer = ClaimIssuer::new(SECRET).unwrap();
        assert!(issuer.verify("not.a.jwt").is_err());
        assert!(issuer.verify("").is_err());
    }
}
