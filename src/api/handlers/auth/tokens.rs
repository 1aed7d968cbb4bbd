//! Access and refresh token issuance and verification.
//!
//! Both token classes are signed JWTs carrying the holder's identity, role
//! and revocation counter. Each class uses its own signing secret so a
//! refresh token can never pass as an access token or vice versa.

use super::types::Role;
use anyhow::{Context, Result};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Claims embedded in both access and refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Holder's user id.
    pub sub: Uuid,
    /// Role at issuance time.
    pub role: Role,
    /// Revocation counter at issuance time.
    pub tv: i32,
    /// Unique token id, keeps repeated issuance from colliding.
    pub jti: Uuid,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Malformed, expired or wrongly signed token.
    #[error("invalid token")]
    Invalid,
    /// Well-formed token whose revocation counter no longer matches.
    #[error("token has been invalidated")]
    Invalidated,
}

/// Snapshot of a user taken when minting tokens.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub user_id: Uuid,
    pub role: Role,
    pub token_version: i32,
}

/// Signing and verification keys for both token classes.
pub struct TokenKeys {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
}

impl TokenKeys {
    #[must_use]
    pub fn from_secrets(access_secret: &SecretString, refresh_secret: &SecretString) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret.expose_secret().as_bytes()),
            access_decoding: DecodingKey::from_secret(access_secret.expose_secret().as_bytes()),
            refresh_encoding: EncodingKey::from_secret(refresh_secret.expose_secret().as_bytes()),
            refresh_decoding: DecodingKey::from_secret(refresh_secret.expose_secret().as_bytes()),
        }
    }
}

/// Mint a short-lived access token.
///
/// # Errors
/// Returns an error if signing fails.
pub fn issue_access_token(
    identity: &TokenIdentity,
    keys: &TokenKeys,
    ttl_seconds: i64,
) -> Result<String> {
    issue(identity, &keys.access_encoding, ttl_seconds).context("failed to sign access token")
}

/// Mint a long-lived refresh token.
///
/// # Errors
/// Returns an error if signing fails.
pub fn issue_refresh_token(
    identity: &TokenIdentity,
    keys: &TokenKeys,
    ttl_seconds: i64,
) -> Result<String> {
    issue(identity, &keys.refresh_encoding, ttl_seconds).context("failed to sign refresh token")
}

fn issue(identity: &TokenIdentity, key: &EncodingKey, ttl_seconds: i64) -> Result<String> {
    let now = get_current_timestamp();
    let exp = if ttl_seconds >= 0 {
        now.saturating_add(ttl_seconds.unsigned_abs())
    } else {
        now.saturating_sub(ttl_seconds.unsigned_abs())
    };
    let claims = TokenClaims {
        sub: identity.user_id,
        role: identity.role,
        tv: identity.token_version,
        jti: Uuid::new_v4(),
        iat: now,
        exp,
    };
    Ok(encode(&Header::new(Algorithm::HS256), &claims, key)?)
}

/// Verify an access token's signature and expiry.
///
/// # Errors
/// Returns [`TokenError::Invalid`] for malformed, expired or wrongly
/// signed tokens.
pub fn verify_access_token(token: &str, keys: &TokenKeys) -> Result<TokenClaims, TokenError> {
    verify(token, &keys.access_decoding)
}

/// Verify a refresh token's signature and expiry.
///
/// # Errors
/// Returns [`TokenError::Invalid`] for malformed, expired or wrongly
/// signed tokens.
pub fn verify_refresh_token(token: &str, keys: &TokenKeys) -> Result<TokenClaims, TokenError> {
    verify(token, &keys.refresh_decoding)
}

fn verify(token: &str, key: &DecodingKey) -> Result<TokenClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    decode::<TokenClaims>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|_| TokenError::Invalid)
}

/// Compare a token's revocation counter against the user's current one.
///
/// # Errors
/// Returns [`TokenError::Invalidated`] when the counters differ.
pub fn check_token_version(claims: &TokenClaims, current_version: i32) -> Result<(), TokenError> {
    if claims.tv == current_version {
        Ok(())
    } else {
        Err(TokenError::Invalidated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn test_keys() -> TokenKeys {
        TokenKeys::from_secrets(
            &SecretString::from("access-secret"),
            &SecretString::from("refresh-secret"),
        )
    }

    fn test_identity() -> TokenIdentity {
        TokenIdentity {
            user_id: Uuid::new_v4(),
            role: Role::Customer,
            token_version: 3,
        }
    }

    #[test]
    fn access_token_round_trip() {
        let keys = test_keys();
        let identity = test_identity();
        let token = issue_access_token(&identity, &keys, 900).unwrap();
        let claims = verify_access_token(&token, &keys).unwrap();
        assert_eq!(claims.sub, identity.user_id);
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.tv, 3);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_round_trip() {
        let keys = test_keys();
        let identity = test_identity();
        let token = issue_refresh_token(&identity, &keys, 604_800).unwrap();
        let claims = verify_refresh_token(&token, &keys).unwrap();
        assert_eq!(claims.sub, identity.user_id);
    }

    #[test]
    fn token_classes_do_not_cross_verify() {
        let keys = test_keys();
        let identity = test_identity();
        let access = issue_access_token(&identity, &keys, 900).unwrap();
        let refresh = issue_refresh_token(&identity, &keys, 900).unwrap();
        assert_eq!(
            verify_refresh_token(&access, &keys),
            Err(TokenError::Invalid)
        );
        assert_eq!(
            verify_access_token(&refresh, &keys),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn expired_token_rejected() {
        let keys = test_keys();
        let identity = test_identity();
        let token = issue_access_token(&identity, &keys, -60).unwrap();
        assert_eq!(verify_access_token(&token, &keys), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_rejected() {
        let keys = test_keys();
        assert_eq!(
            verify_access_token("not-a-token", &keys),
            Err(TokenError::Invalid)
        );
    }

    #[test]
    fn repeated_issuance_yields_fresh_tokens() {
        let keys = test_keys();
        let identity = test_identity();
        let first = issue_access_token(&identity, &keys, 900).unwrap();
        let second = issue_access_token(&identity, &keys, 900).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn stale_version_invalidated() {
        let keys = test_keys();
        let identity = test_identity();
        let token = issue_access_token(&identity, &keys, 900).unwrap();
        let claims = verify_access_token(&token, &keys).unwrap();
        assert!(check_token_version(&claims, 3).is_ok());
        assert_eq!(
            check_token_version(&claims, 4),
            Err(TokenError::Invalidated)
        );
    }
}
