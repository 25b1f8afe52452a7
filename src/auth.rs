//! Password hashing and bearer tokens.
//!
//! Tokens are HS256 JWTs carrying `{userId, iat, exp}` and live for seven days.
//! Hashing runs on the blocking pool since bcrypt is deliberately slow.

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

pub const TOKEN_LIFETIME_DAYS: i64 = 7;

const NO_TOKEN: &str = "No token, authorization denied";
const INVALID_TOKEN: &str = "Token is not valid";
const EXPIRED_TOKEN: &str = "Token has expired";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Signs and checks tokens, and hashes passwords at the configured cost.
#[derive(Clone)]
pub struct Authenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    hash_cost: u32,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("hash_cost", &self.hash_cost)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(secret: &str, hash_cost: u32) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            hash_cost,
        }
    }

    pub fn issue_token(&self, user_id: &str) -> AppResult<String> {
        self.issue_token_at(user_id, Utc::now())
    }

    /// Issues a token as if it had been created at `issued_at`.
    pub fn issue_token_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> AppResult<String> {
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .context("signing token")?;
        Ok(token)
    }

    /// Returns the user id a valid token was issued for.
    pub fn verify_token(&self, token: &str) -> AppResult<String> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.user_id),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => {
                Err(AppError::auth(EXPIRED_TOKEN))
            }
            Err(_) => Err(AppError::auth(INVALID_TOKEN)),
        }
    }

    pub async fn hash_password(&self, password: &str) -> AppResult<String> {
        let password = password.to_string();
        let cost = self.hash_cost;
        let hash = tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .context("joining hash task")?
            .context("hashing password")?;
        Ok(hash)
    }

    /// A malformed stored hash counts as a mismatch.
    pub async fn verify_password(&self, password: &str, hash: &str) -> AppResult<bool> {
        let password = password.to_string();
        let hash = hash.to_string();
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .context("joining verify task")?
            .unwrap_or(false);
        Ok(matches)
    }
}

/// Pulls the token out of an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: Option<&str>) -> AppResult<&str> {
    let value = header.unwrap_or_default().trim_start();
    if value.is_empty() {
        return Err(AppError::auth(NO_TOKEN));
    }
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .ok_or_else(|| AppError::auth(INVALID_TOKEN))?;
    if token.is_empty() {
        return Err(AppError::auth(NO_TOKEN));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authenticator() -> Authenticator {
        Authenticator::new("test-secret", 4)
    }

    fn auth_message(err: AppError) -> String {
        match err {
            AppError::Auth(message) => message,
            other => panic!("expected auth error, got {other:?}"),
        }
    }

    #[test]
    fn issued_token_verifies_to_same_user() {
        let auth = authenticator();
        let token = auth.issue_token("user-1").unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), "user-1");
    }

    #[test]
    fn token_expires_after_seven_days() {
        let auth = authenticator();
        let issued = Utc::now() - Duration::days(TOKEN_LIFETIME_DAYS) - Duration::seconds(5);
        let token = auth.issue_token_at("user-1", issued).unwrap();
        let err = auth.verify_token(&token).unwrap_err();
        assert_eq!(auth_message(err), "Token has expired");

        let recent = Utc::now() - Duration::days(TOKEN_LIFETIME_DAYS - 1);
        let token = auth.issue_token_at("user-1", recent).unwrap();
        assert!(auth.verify_token(&token).is_ok());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let token = Authenticator::new("other", 4).issue_token("user-1").unwrap();
        let err = authenticator().verify_token(&token).unwrap_err();
        assert_eq!(auth_message(err), "Token is not valid");

        let err = authenticator().verify_token("garbage").unwrap_err();
        assert_eq!(auth_message(err), "Token is not valid");
    }

    #[test]
    fn bearer_header_parsing() {
        assert_eq!(bearer_token(Some("Bearer abc")).unwrap(), "abc");
        assert_eq!(
            auth_message(bearer_token(None).unwrap_err()),
            "No token, authorization denied"
        );
        assert_eq!(
            auth_message(bearer_token(Some("Bearer ")).unwrap_err()),
            "No token, authorization denied"
        );
        assert_eq!(
            auth_message(bearer_token(Some("Basic abc")).unwrap_err()),
            "Token is not valid"
        );
    }

    #[tokio::test]
    async fn password_hash_round_trip() {
        let auth = authenticator();
        let hash = auth.hash_password("password123").await.unwrap();
        assert_ne!(hash, "password123");
        assert!(auth.verify_password("password123", &hash).await.unwrap());
        assert!(!auth.verify_password("wrong", &hash).await.unwrap());
        assert!(!auth.verify_password("password123", "not-a-hash").await.unwrap());
    }
}
