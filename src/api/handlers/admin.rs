//! Administrative endpoints, restricted to the admin role.

use super::auth::AuthState;
use super::auth::principal::require_auth;
use super::auth::storage;
use super::auth::types::{Role, UserSummary};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

/// Upper bound on the user listing; there is no pagination yet.
const LIST_LIMIT: i64 = 100;

#[utoipa::path(
    get,
    path = "/v1/admin/users",
    responses(
        (status = 200, description = "Registered users, newest first", body = [UserSummary]),
        (status = 401, description = "Missing, invalid or revoked access token"),
        (status = 403, description = "Caller is not an admin"),
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
pub async fn list_users(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &pool, &state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };
    if let Err(status) = principal.require_role(&[Role::Admin]) {
        return status.into_response();
    }

    match storage::list_users(&pool, LIST_LIMIT).await {
        Ok(users) => {
            let users: Vec<UserSummary> = users
                .into_iter()
                .map(|user| UserSummary {
                    id: user.id,
                    name: user.name,
                    email: user.email,
                    role: user.role,
                })
                .collect();
            (StatusCode::OK, Json(users)).into_response()
        }
        Err(err) => {
            error!("Failed to list users: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
