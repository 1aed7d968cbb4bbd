//! Session lifecycle: register, login, refresh, logout.
//!
//! Refresh tokens travel only in an HttpOnly cookie; bodies carry the
//! access token. Login replaces every stored session for the user, so a
//! stolen refresh token dies the next time the real owner signs in.

use super::rate_limit::{RateLimitDecision, RateLimitScope};
use super::storage::{self, InsertUserOutcome, RefreshLookup, UserRecord};
use super::tokens::{
    TokenIdentity, check_token_version, issue_access_token, issue_refresh_token,
    verify_refresh_token,
};
use super::types::{
    AccessTokenResponse, AuthResponse, ErrorResponse, FieldError, LoginRequest, MessageResponse,
    RegisterRequest, UserSummary, ValidationErrorResponse,
};
use super::utils::{extract_client_ip, extract_cookie, hash_token, normalize_email, valid_email};
use super::AuthState;
use axum::{
    Extension, Json,
    extract::ConnectInfo,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};

pub(crate) const REFRESH_COOKIE: &str = "clavis_refresh";

const MIN_PASSWORD_LEN: usize = 6;

/// Build the Set-Cookie value carrying a refresh token.
fn build_refresh_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{REFRESH_COOKIE}={token}; Path=/v1/auth; Max-Age={max_age_seconds}; HttpOnly; SameSite=Strict{secure}"
    )
}

/// Build the Set-Cookie value that removes the refresh cookie.
fn clear_refresh_cookie(secure: bool) -> String {
    build_refresh_cookie("", 0, secure)
}

fn with_cookie(mut response: Response, cookie: &str) -> Response {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().insert(header::SET_COOKIE, value);
            response
        }
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            internal_error()
        }
    }
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Internal server error")),
    )
        .into_response()
}

/// Count the request against the credential window, rejecting with 429
/// and a Retry-After header once the window is full.
pub(super) fn auth_gate(
    state: &AuthState,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Result<(), Response> {
    let client = extract_client_ip(headers, peer);
    match state
        .rate_limiter()
        .check(client.as_deref(), RateLimitScope::Auth)
    {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Limited {
            retry_after_seconds,
        } => {
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(ErrorResponse::new(
                    "Too many attempts, please try again later",
                )),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            Err(response)
        }
    }
}

fn user_agent(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn summarize(user: &UserRecord) -> UserSummary {
    UserSummary {
        id: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: user.role,
    }
}

struct TokenPair {
    access: String,
    refresh: String,
}

fn issue_pair(state: &AuthState, user: &UserRecord) -> Result<TokenPair, Response> {
    let identity = TokenIdentity {
        user_id: user.id,
        role: user.role,
        token_version: user.token_version,
    };
    let access = issue_access_token(
        &identity,
        state.keys(),
        state.config().access_token_ttl_seconds(),
    );
    let refresh = issue_refresh_token(
        &identity,
        state.keys(),
        state.config().refresh_token_ttl_seconds(),
    );
    match (access, refresh) {
        (Ok(access), Ok(refresh)) => Ok(TokenPair { access, refresh }),
        (Err(err), _) | (_, Err(err)) => {
            error!("Failed to issue tokens: {err}");
            Err(internal_error())
        }
    }
}

fn validate_register(payload: &RegisterRequest) -> Vec<FieldError> {
    let mut errors = Vec::new();
    if payload.name.trim().is_empty() {
        errors.push(FieldError {
            field: "name",
            message: "Please provide a name",
        });
    }
    if !valid_email(&normalize_email(&payload.email)) {
        errors.push(FieldError {
            field: "email",
            message: "Please provide a valid email",
        });
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        errors.push(FieldError {
            field: "password",
            message: "Password must be at least 6 characters",
        });
    }
    errors
}

/// Create an account and open a first session.
#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Validation failed or email taken", body = ValidationErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    if let Err(response) = auth_gate(&state, &headers, peer) {
        return response;
    }

    let payload = payload.map_or_else(
        || RegisterRequest {
            name: String::new(),
            email: String::new(),
            password: String::new(),
        },
        |Json(payload)| payload,
    );

    let errors = validate_register(&payload);
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse::new(errors)),
        )
            .into_response();
    }

    let email = normalize_email(&payload.email);

    let password_hash = match super::password::hash_password(payload.password).await {
        Ok(hash) => hash,
        Err(err) => {
            error!("Failed to hash password: {err}");
            return internal_error();
        }
    };

    let user = match storage::insert_user(&pool, payload.name.trim(), &email, &password_hash).await
    {
        Ok(InsertUserOutcome::Created(user)) => user,
        Ok(InsertUserOutcome::DuplicateEmail) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse::new("User already exists")),
            )
                .into_response();
        }
        Err(err) => {
            error!("Failed to create user: {err}");
            return internal_error();
        }
    };

    let pair = match issue_pair(&state, &user) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    if let Err(err) = storage::insert_refresh_token(
        &pool,
        user.id,
        &hash_token(&pair.refresh),
        state.config().refresh_token_ttl_seconds(),
        extract_client_ip(&headers, peer).as_deref(),
        user_agent(&headers).as_deref(),
    )
    .await
    {
        error!("Failed to store session: {err}");
        return internal_error();
    }

    info!(user_id = %user.id, "New account registered");

    let cookie = build_refresh_cookie(
        &pair.refresh,
        state.config().refresh_token_ttl_seconds(),
        state.config().refresh_cookie_secure(),
    );
    let response = (
        StatusCode::CREATED,
        Json(AuthResponse {
            access_token: pair.access,
            user: summarize(&user),
        }),
    )
        .into_response();
    with_cookie(response, &cookie)
}

/// Authenticate and open a fresh session, replacing previous ones.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = AuthResponse),
        (status = 400, description = "Validation failed", body = ValidationErrorResponse),
        (status = 401, description = "Invalid email or password", body = ErrorResponse),
        (status = 429, description = "Too many attempts", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Response {
    let peer = peer.map(|ConnectInfo(addr)| addr);
    if let Err(response) = auth_gate(&state, &headers, peer) {
        return response;
    }

    let payload = payload.map_or_else(
        || LoginRequest {
            email: String::new(),
            password: String::new(),
        },
        |Json(payload)| payload,
    );

    let mut errors = Vec::new();
    if payload.email.trim().is_empty() {
        errors.push(FieldError {
            field: "email",
            message: "Please provide an email",
        });
    }
    if payload.password.is_empty() {
        errors.push(FieldError {
            field: "password",
            message: "Please provide a password",
        });
    }
    if !errors.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ValidationErrorResponse::new(errors)),
        )
            .into_response();
    }

    // Same response for unknown email and wrong password.
    let rejected = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new("Invalid email or password")),
        )
            .into_response()
    };

    let email = normalize_email(&payload.email);
    let credentials = match storage::lookup_credentials(&pool, &email).await {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return rejected(),
        Err(err) => {
            error!("Failed to look up credentials: {err}");
            return internal_error();
        }
    };

    match super::password::verify_password(payload.password, credentials.password_hash).await {
        Ok(true) => {}
        Ok(false) => return rejected(),
        Err(err) => {
            error!("Failed to verify password: {err}");
            return internal_error();
        }
    }

    let user = credentials.user;
    let pair = match issue_pair(&state, &user) {
        Ok(pair) => pair,
        Err(response) => return response,
    };

    if let Err(err) = storage::rotate_refresh_tokens(
        &pool,
        user.id,
        &hash_token(&pair.refresh),
        state.config().refresh_token_ttl_seconds(),
        extract_client_ip(&headers, peer).as_deref(),
        user_agent(&headers).as_deref(),
    )
    .await
    {
        error!("Failed to rotate sessions: {err}");
        return internal_error();
    }

    info!(user_id = %user.id, "User logged in");

    let cookie = build_refresh_cookie(
        &pair.refresh,
        state.config().refresh_token_ttl_seconds(),
        state.config().refresh_cookie_secure(),
    );
    let response = (
        StatusCode::OK,
        Json(AuthResponse {
            access_token: pair.access,
            user: summarize(&user),
        }),
    )
        .into_response();
    with_cookie(response, &cookie)
}

/// Exchange the refresh cookie for a new access token.
#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 400, description = "No refresh token provided", body = ErrorResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn refresh(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
) -> Response {
    let Some(token) = extract_cookie(&headers, REFRESH_COOKIE) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new("No refresh token provided")),
        )
            .into_response();
    };

    let rejected = |message: &str| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(message)),
        )
            .into_response()
    };

    let Ok(claims) = verify_refresh_token(&token, state.keys()) else {
        return rejected("Invalid refresh token");
    };

    let token_hash = hash_token(&token);
    let user_id = match storage::lookup_refresh_token(&pool, &token_hash).await {
        Ok(RefreshLookup::Valid { user_id }) => user_id,
        Ok(RefreshLookup::Missing) => return rejected("Invalid refresh token"),
        Ok(RefreshLookup::Expired) => return rejected("Refresh token expired"),
        Err(err) => {
            error!("Failed to look up refresh token: {err}");
            return internal_error();
        }
    };

    if claims.sub != user_id {
        return rejected("Invalid refresh token");
    }

    let user = match storage::lookup_user(&pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => return rejected("Invalid refresh token"),
        Err(err) => {
            error!("Failed to resolve token holder: {err}");
            return internal_error();
        }
    };

    // The counter may have advanced since this session was stored.
    if check_token_version(&claims, user.token_version).is_err() {
        if let Err(err) = storage::delete_refresh_token(&pool, &token_hash).await {
            error!("Failed to drop revoked session: {err}");
        }
        return rejected("Invalid refresh token");
    }

    let identity = TokenIdentity {
        user_id: user.id,
        role: user.role,
        token_version: user.token_version,
    };
    let access = match issue_access_token(
        &identity,
        state.keys(),
        state.config().access_token_ttl_seconds(),
    ) {
        Ok(access) => access,
        Err(err) => {
            error!("Failed to issue access token: {err}");
            return internal_error();
        }
    };

    (StatusCode::OK, Json(AccessTokenResponse { access_token: access })).into_response()
}

/// Close the current session. Safe to call without one.
#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Logged out", body = MessageResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
) -> Response {
    if let Some(token) = extract_cookie(&headers, REFRESH_COOKIE) {
        if let Err(err) = storage::delete_refresh_token(&pool, &hash_token(&token)).await {
            error!("Failed to delete session: {err}");
            return internal_error();
        }
    }

    let response = (
        StatusCode::OK,
        Json(MessageResponse::new("Logged out")),
    )
        .into_response();
    with_cookie(
        response,
        &clear_refresh_cookie(state.config().refresh_cookie_secure()),
    )
}

/// Revoke every outstanding token and session for the caller.
#[utoipa::path(
    post,
    path = "/v1/auth/logout-all",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized"),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    headers: HeaderMap,
    Extension(pool): Extension<PgPool>,
    Extension(state): Extension<Arc<AuthState>>,
) -> Response {
    let principal = match super::principal::require_auth(&headers, &pool, &state).await {
        Ok(principal) => principal,
        Err(status) => return status.into_response(),
    };

    if let Err(err) = storage::bump_token_version(&pool, principal.user_id).await {
        error!("Failed to bump token version: {err}");
        return internal_error();
    }
    if let Err(err) = storage::delete_refresh_tokens_for_user(&pool, principal.user_id).await {
        error!("Failed to delete sessions: {err}");
        return internal_error();
    }

    info!(user_id = %principal.user_id, "All sessions revoked");

    let response = (
        StatusCode::OK,
        Json(MessageResponse::new("Logged out of all sessions")),
    )
        .into_response();
    with_cookie(
        response,
        &clear_refresh_cookie(state.config().refresh_cookie_secure()),
    )
}
