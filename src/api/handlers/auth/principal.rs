//! Bearer token verification for protected routes.

use super::storage;
use super::tokens::{check_token_version, verify_access_token};
use super::types::Role;
use super::utils::extract_bearer_token;
use crate::api::handlers::auth::AuthState;
use axum::http::{HeaderMap, StatusCode};
use sqlx::PgPool;
use tracing::{debug, error};
use uuid::Uuid;

/// Verified caller identity, resolved from a bearer token.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl Principal {
    /// Require one of the given roles.
    ///
    /// # Errors
    /// Returns 403 when the caller's role is not in `roles`.
    pub fn require_role(&self, roles: &[Role]) -> Result<(), StatusCode> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Resolve and verify the caller from the Authorization header.
///
/// The token must carry a valid signature, be unexpired, and its
/// revocation counter must still match the user record. A revoked token
/// is indistinguishable from an invalid one to the caller.
///
/// # Errors
/// Returns 401 for missing, invalid or revoked tokens and 500 when the
/// user lookup fails.
pub async fn require_auth(
    headers: &HeaderMap,
    pool: &PgPool,
    state: &AuthState,
) -> Result<Principal, StatusCode> {
    let Some(token) = extract_bearer_token(headers) else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let claims = verify_access_token(&token, state.keys()).map_err(|err| {
        debug!("Rejected access token: {err}");
        StatusCode::UNAUTHORIZED
    })?;

    let user = storage::lookup_user(pool, claims.sub)
        .await
        .map_err(|err| {
            error!("Failed to resolve token holder: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    check_token_version(&claims, user.token_version).map_err(|err| {
        debug!("Rejected access token: {err}");
        StatusCode::UNAUTHORIZED
    })?;

    Ok(Principal {
        user_id: user.id,
        name: user.name,
        email: user.email,
        role: user.role,
    })
}
