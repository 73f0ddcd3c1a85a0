use chrono::{Duration, Utc};
use cofound_shared::Role;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,        // User ID
    pub email: String,
    pub username: String,
    pub role: Role,
    pub kind: TokenKind,
    pub jti: Uuid,        // Unique per token so rotated refresh tokens differ
    pub exp: i64,         // Expiration timestamp
    pub iat: i64,         // Issued at timestamp
}

/// Who a token is issued to.
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub role: Role,
}

fn create_token(
    subject: TokenSubject<'_>,
    kind: TokenKind,
    jti: Uuid,
    secret: &str,
    expires_in_secs: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expires_in_secs);

    let claims = Claims {
        sub: subject.user_id,
        email: subject.email.to_string(),
        username: subject.username.to_string(),
        role: subject.role,
        kind,
        jti,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to create token: {}", e)))
}

pub fn create_access_token(
    subject: TokenSubject<'_>,
    secret: &str,
    expires_in_secs: i64,
) -> Result<String, AppError> {
    create_token(subject, TokenKind::Access, Uuid::new_v4(), secret, expires_in_secs)
}

/// `jti` is the key the refresh token is stored under.
pub fn create_refresh_token(
    subject: TokenSubject<'_>,
    jti: Uuid,
    secret: &str,
    expires_in_secs: i64,
) -> Result<String, AppError> {
    create_token(subject, TokenKind::Refresh, jti, secret, expires_in_secs)
}

fn verify_token(token: &str, secret: &str, kind: TokenKind) -> Result<Claims, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Token verification failed: {}", e);
        AppError::Unauthorized
    })?;

    if token_data.claims.kind != kind {
        tracing::debug!("Token kind mismatch: expected {:?}", kind);
        return Err(AppError::Unauthorized);
    }

    Ok(token_data.claims)
}

pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    verify_token(token, secret, TokenKind::Access)
}

pub fn verify_refresh_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    verify_token(token, secret, TokenKind::Refresh)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subject() -> TokenSubject<'static> {
        TokenSubject {
            user_id: Uuid::nil(),
            email: "alice@example.com",
            username: "alice",
            role: Role::Founder,
        }
    }

    #[test]
    fn test_access_token_round_trip() {
        let token = create_access_token(subject(), "secret", 60).unwrap();
        let claims = verify_access_token(&token, "secret").unwrap();
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Founder);
        assert!(verify_access_token(&token, "other-secret").is_err());
    }

    #[test]
    fn test_token_kinds_are_not_interchangeable() {
        let jti = Uuid::new_v4();
        let refresh = create_refresh_token(subject(), jti, "secret", 60).unwrap();
        assert!(verify_access_token(&refresh, "secret").is_err());
        assert_eq!(verify_refresh_token(&refresh, "secret").unwrap().jti, jti);
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = create_access_token(subject(), "secret", -600).unwrap();
        assert!(matches!(
            verify_access_token(&token, "secret"),
            Err(AppError::Unauthorized)
        ));
    }
}
