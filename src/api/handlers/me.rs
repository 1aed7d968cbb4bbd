//! Authenticated self-service endpoint.

use super::auth::AuthState;
use super::auth::principal::require_auth;
use super::auth::types::UserSummary;
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use sqlx::PgPool;
use std::sync::Arc;

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "The authenticated user", body = UserSummary),
        (status = 401, description = "Missing, invalid or revoked access token"),
    ),
    security(("bearer" = [])),
    tag = "me"
)]
pub async fn get_me(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
) -> impl IntoResponse {
    match require_auth(&headers, &pool, &state).await {
        Ok(principal) => (
            StatusCode::OK,
            Json(UserSummary {
                id: principal.user_id,
                name: principal.name,
                email: principal.email,
                role: principal.role,
            }),
        )
            .into_response(),
        Err(status) => status.into_response(),
    }
}
