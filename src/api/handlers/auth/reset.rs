//! Password reset over email.
//!
//! The reset secret is random, short-lived and single-use. Only its hash
//! is stored; if the mail cannot be delivered the pending secret is
//! cleared so no orphaned reset window stays open.

use super::storage;
use super::types::{
    ErrorResponse, FieldError, ForgotPasswordRequest, MessageResponse, ResetPasswordRequest,
    ValidationErrorResponse,
};
use super::utils::{build_reset_url, generate_reset_secret, hash_token, normalize_email, valid_email};
use super::AuthState;
use crate::api::email::MailMessage;
use axum::{
    Extension, Json,
    extract::Path,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info, warn};

const MIN_PASSWORD_LEN: usize = 6;

fn internal_error(message: &str) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new(message)),
    )
        .into_response()
}

fn reset_mail(to_email: &str, reset_url: &str) -> MailMessage {
    MailMessage {
        to_email: to_email.to_string(),
        subject: "Password reset request".to_string(),
        body_html: format!(
            "<p>You requested a password reset. The link below is valid for a short time \
             and can be used once:</p><p><a href=\"{reset_url}\">{reset_url}</a></p>\
             <p>If you did not request this, you can ignore this email.</p>"
        ),
    }
}

/// Start a password reset by mailing a single-use link.
///
/// Only the global admission window applies here; the strict auth window
/// is for register/login, and a user locked out by failed logins must
/// still be able to request a reset.
#[utoipa::path(
    post,
    path = "/v1/auth/forgot-password",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent", body = MessageResponse),
        (status = 400, description = "Validation failed", body = ValidationErrorResponse),
        (status = 404, description = "Unknown email", body = ErrorResponse),
        (status = 500, description = "Email could not be sent", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn forgot_password(
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<ForgotPasswordRequest>>,
) -> Response {
    let payload = payload.map_or_else(
        || ForgotPasswordRequest {
            email: String::new(),
        },
        |Json(payload)| payload,
    );

    let email = normalize_email(&payload.email);
    if !valid_email(&email) {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse::new(vec![FieldError {
                field: "email",
                message: "Please provide a valid email",
            }])),
        )
            .into_response();
    }

    let user = match storage::lookup_user_by_email(&pool, &email).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new("User not found")),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to look up user: {err}");
            return internal_error("Internal server error");
        }
    };

    let secret = match generate_reset_secret() {
        Ok(secret) => secret,
        Err(err) => {
            error!("Failed to generate reset secret: {err}");
            return internal_error("Internal server error");
        }
    };

    if let Err(err) = storage::store_reset_token(
        &pool,
        user.id,
        &hash_token(&secret),
        state.config().reset_token_ttl_seconds(),
    )
    .await
    {
        error!("Failed to store reset token: {err}");
        return internal_error("Internal server error");
    }

    let reset_url = build_reset_url(state.config().frontend_base_url(), &secret);
    let message = reset_mail(&user.email, &reset_url);

    let sent = tokio::time::timeout(state.config().mail_timeout(), state.mailer().send(&message))
        .await;
    let delivery = match sent {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!("Failed to send reset email: {err}");
            Err(())
        }
        Err(_) => {
            error!("Timed out sending reset email");
            Err(())
        }
    };

    if delivery.is_err() {
        // Undeliverable link must not leave a usable reset window open.
        if let Err(err) = storage::clear_reset_token(&pool, user.id).await {
            warn!("Failed to clear pending reset token: {err}");
        }
        return internal_error("Email could not be sent, please try again later");
    }

    info!(user_id = %user.id, "Password reset email sent");

    (
        StatusCode::OK,
        Json(MessageResponse::new("Password reset email sent")),
    )
        .into_response()
}

/// Complete a password reset with the mailed secret.
#[utoipa::path(
    put,
    path = "/v1/auth/reset-password/{token}",
    params(("token" = String, Path, description = "Reset secret from the email link")),
    request_body = ResetPasswordRequest,
    responses(
        (status = 200, description = "Password reset", body = MessageResponse),
        (status = 400, description = "Invalid input or unknown token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn reset_password(
    Path(token): Path<String>,
    Extension(pool): Extension<PgPool>,
    payload: Option<Json<ResetPasswordRequest>>,
) -> Response {
    let payload = payload.map_or_else(
        || ResetPasswordRequest {
            password: String::new(),
        },
        |Json(payload)| payload,
    );

    if payload.password.len() < MIN_PASSWORD_LEN {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse::new(vec![FieldError {
                field: "password",
                message: "Password must be at least 6 characters",
            }])),
        )
            .into_response();
    }

    let password_hash = match super::password::hash_password(payload.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return internal_error("Internal server error");
        }
    };

    match storage::consume_reset_token(&pool, &hash_token(&token), &password_hash).await {
        Ok(true) => {
            info!("Password reset completed");
            (
                StatusCode::OK,
                Json(MessageResponse::new("Password reset successful")),
            )
                .into_response()
        }
        Ok(false) => (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("Invalid or expired reset token")),
        )
            .into_response(),
        Err(err) => {
            error!("Failed to consume reset token: {err}");
            internal_error("Internal server error")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::email::LogMailSender;
    use crate::api::handlers::auth::rate_limit::{
        NoopRateLimiter, RateLimitSettings, RateLimiter, WindowedLimiter,
    };
    use crate::api::handlers::auth::state::AuthConfig;
    use crate::api::handlers::auth::tokens::TokenKeys;
    use secrecy::SecretString;
    use std::time::Duration;

    fn state_with(limiter: Arc<dyn RateLimiter>) -> Arc<AuthState> {
        Arc::new(AuthState::new(
            AuthConfig::new("http://localhost:3000".to_string()),
            TokenKeys::from_secrets(
                &SecretString::from("access-secret"),
                &SecretString::from("refresh-secret"),
            ),
            limiter,
            Arc::new(LogMailSender),
        ))
    }

    fn test_state() -> Arc<AuthState> {
        state_with(Arc::new(NoopRateLimiter))
    }

    fn lazy_pool() -> PgPool {
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_millis(100))
            .connect_lazy("postgres://localhost:1/none")
            .unwrap()
    }

    #[test]
    fn reset_mail_contains_link() {
        let message = reset_mail("alice@example.com", "http://localhost:3000/auth/reset-password/abc");
        assert_eq!(message.to_email, "alice@example.com");
        assert!(message.body_html.contains("/auth/reset-password/abc"));
    }

    #[tokio::test]
    async fn forgot_password_rejects_invalid_email() {
        let response = forgot_password(
            Extension(lazy_pool()),
            Extension(test_state()),
            Some(Json(ForgotPasswordRequest {
                email: "not-an-email".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn forgot_password_rejects_missing_body() {
        let response = forgot_password(
            Extension(lazy_pool()),
            Extension(test_state()),
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    // The strict auth window covers register/login only; a user locked out
    // by failed logins must still be able to start a reset.
    #[tokio::test]
    async fn forgot_password_ignores_auth_window() {
        let state = state_with(Arc::new(WindowedLimiter::new(RateLimitSettings {
            global_window: Duration::from_secs(900),
            global_max: 100,
            auth_window: Duration::from_secs(600),
            auth_max: 1,
            throttle_after: 50,
            throttle_step: Duration::from_millis(100),
            throttle_cap: Duration::from_millis(2000),
        })));
        for _ in 0..3 {
            let response = forgot_password(
                Extension(lazy_pool()),
                Extension(state.clone()),
                Some(Json(ForgotPasswordRequest {
                    email: "not-an-email".to_string(),
                })),
            )
            .await;
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[tokio::test]
    async fn reset_password_rejects_short_password() {
        let response = reset_password(
            Path("some-token".to_string()),
            Extension(lazy_pool()),
            Some(Json(ResetPasswordRequest {
                password: "123".to_string(),
            })),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
