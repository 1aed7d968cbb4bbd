//! Postgres persistence for users, refresh tokens and reset secrets.
//!
//! Expiry and single-use checks run inside the statements themselves so
//! concurrent calls cannot race between read and write.

use super::types::Role;
use anyhow::{Context, Result};
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub token_version: i32,
}

/// User plus password hash, only fetched for login.
#[derive(Debug)]
pub(super) struct CredentialRecord {
    pub user: UserRecord,
    pub password_hash: String,
}

pub(super) enum InsertUserOutcome {
    Created(UserRecord),
    DuplicateEmail,
}

/// Result of resolving a presented refresh token hash.
#[derive(Debug, PartialEq, Eq)]
pub(super) enum RefreshLookup {
    Missing,
    Expired,
    Valid { user_id: Uuid },
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> Result<UserRecord> {
    let role: String = row.get("role");
    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        role: role.parse()?,
        token_version: row.get("token_version"),
    })
}

/// Insert a new user with the default role.
pub(super) async fn insert_user(
    pool: &PgPool,
    name: &str,
    email: &str,
    password_hash: &str,
) -> Result<InsertUserOutcome> {
    let query = "INSERT INTO users (name, email, password_hash) VALUES ($1, $2, $3) \
                 RETURNING id, name, email, role::text AS role, token_version";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    let result = sqlx::query(query)
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .fetch_one(pool)
        .instrument(span)
        .await;
    match result {
        Ok(row) => Ok(InsertUserOutcome::Created(user_from_row(&row)?)),
        Err(err) if super::utils::is_unique_violation(&err) => Ok(InsertUserOutcome::DuplicateEmail),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

pub(super) async fn lookup_credentials(
    pool: &PgPool,
    email: &str,
) -> Result<Option<CredentialRecord>> {
    let query = "SELECT id, name, email, role::text AS role, token_version, password_hash \
                 FROM users WHERE email = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up credentials")?;
    row.map(|row| {
        Ok(CredentialRecord {
            user: user_from_row(&row)?,
            password_hash: row.get("password_hash"),
        })
    })
    .transpose()
}

pub(crate) async fn lookup_user(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = "SELECT id, name, email, role::text AS role, token_version \
                 FROM users WHERE id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user")?;
    row.as_ref().map(user_from_row).transpose()
}

pub(super) async fn lookup_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = "SELECT id, name, email, role::text AS role, token_version \
                 FROM users WHERE email = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up user by email")?;
    row.as_ref().map(user_from_row).transpose()
}

/// List users for the administrative overview, newest first.
pub(crate) async fn list_users(pool: &PgPool, limit: i64) -> Result<Vec<UserRecord>> {
    let query = "SELECT id, name, email, role::text AS role, token_version \
                 FROM users ORDER BY created_at DESC LIMIT $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let rows = sqlx::query(query)
        .bind(limit)
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list users")?;
    rows.iter().map(user_from_row).collect()
}

/// Store a refresh token hash for a fresh session.
pub(super) async fn insert_refresh_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let query = "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, ip, user_agent) \
                 VALUES ($1, $2, NOW() + make_interval(secs => $3), $4, $5) \
                 ON CONFLICT (user_id, token_hash) DO NOTHING";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds as f64)
        .bind(ip)
        .bind(user_agent)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store refresh token")?;
    Ok(())
}

/// Replace all of a user's sessions with a single fresh one.
///
/// Delete and insert run in one transaction so a crash can never leave the
/// user with both old and new sessions.
pub(super) async fn rotate_refresh_tokens(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
    ip: Option<&str>,
    user_agent: Option<&str>,
) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("failed to begin session rotation")?;

    let delete = "DELETE FROM refresh_tokens WHERE user_id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
    sqlx::query(delete)
        .bind(user_id)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to clear previous sessions")?;

    let insert = "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, ip, user_agent) \
                  VALUES ($1, $2, NOW() + make_interval(secs => $3), $4, $5)";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "INSERT");
    sqlx::query(insert)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds as f64)
        .bind(ip)
        .bind(user_agent)
        .execute(&mut *tx)
        .instrument(span)
        .await
        .context("failed to store refresh token")?;

    tx.commit().await.context("failed to commit session rotation")
}

/// Resolve a refresh token hash, deleting it if the record has expired.
pub(super) async fn lookup_refresh_token(pool: &PgPool, token_hash: &[u8]) -> Result<RefreshLookup> {
    let query = "SELECT user_id, (expires_at <= NOW()) AS expired \
                 FROM refresh_tokens WHERE token_hash = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "SELECT");
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to look up refresh token")?;
    let Some(row) = row else {
        return Ok(RefreshLookup::Missing);
    };
    let expired: bool = row.get("expired");
    if expired {
        delete_refresh_token(pool, token_hash).await?;
        return Ok(RefreshLookup::Expired);
    }
    Ok(RefreshLookup::Valid {
        user_id: row.get("user_id"),
    })
}

/// Remove a session by token hash. Deleting an absent row is not an error.
pub(super) async fn delete_refresh_token(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM refresh_tokens WHERE token_hash = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete refresh token")?;
    Ok(())
}

pub(super) async fn delete_refresh_tokens_for_user(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "DELETE FROM refresh_tokens WHERE user_id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "DELETE");
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete user sessions")?;
    Ok(())
}

/// Advance the revocation counter, invalidating every outstanding token.
pub(super) async fn bump_token_version(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET token_version = token_version + 1, updated_at = NOW() \
                 WHERE id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to bump token version")?;
    Ok(())
}

/// Attach a reset secret hash to the user, replacing any previous one.
pub(super) async fn store_reset_token(
    pool: &PgPool,
    user_id: Uuid,
    token_hash: &[u8],
    ttl_seconds: i64,
) -> Result<()> {
    let query = "UPDATE users SET reset_token_hash = $2, \
                 reset_token_expires_at = NOW() + make_interval(secs => $3), \
                 updated_at = NOW() WHERE id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    sqlx::query(query)
        .bind(user_id)
        .bind(token_hash)
        .bind(ttl_seconds as f64)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to store reset token")?;
    Ok(())
}

/// Drop a pending reset secret, e.g. after the reset mail failed to send.
pub(super) async fn clear_reset_token(pool: &PgPool, user_id: Uuid) -> Result<()> {
    let query = "UPDATE users SET reset_token_hash = NULL, reset_token_expires_at = NULL, \
                 updated_at = NOW() WHERE id = $1";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    sqlx::query(query)
        .bind(user_id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to clear reset token")?;
    Ok(())
}

/// Consume a reset secret and set the new password in one statement.
///
/// The guard in the WHERE clause makes the secret single-use under
/// concurrency: only one caller can match the hash before it is cleared.
/// The revocation counter is bumped in the same statement so existing
/// sessions die with the old password. Returns false when the secret is
/// unknown, expired or already used.
pub(super) async fn consume_reset_token(
    pool: &PgPool,
    token_hash: &[u8],
    new_password_hash: &str,
) -> Result<bool> {
    let query = "UPDATE users SET password_hash = $2, \
                 token_version = token_version + 1, \
                 reset_token_hash = NULL, reset_token_expires_at = NULL, \
                 updated_at = NOW() \
                 WHERE reset_token_hash = $1 AND reset_token_expires_at > NOW() \
                 RETURNING id";
    let span = info_span!("db.query", db.system = "postgresql", db.operation = "UPDATE");
    let row = sqlx::query(query)
        .bind(token_hash)
        .bind(new_password_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to consume reset token")?;
    if let Some(row) = &row {
        let user_id: Uuid = row.get("id");
        delete_refresh_tokens_for_user(pool, user_id).await?;
    }
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_lookup_variants_compare() {
        assert_eq!(RefreshLookup::Missing, RefreshLookup::Missing);
        assert_ne!(RefreshLookup::Missing, RefreshLookup::Expired);
        let user_id = Uuid::new_v4();
        assert_eq!(
            RefreshLookup::Valid { user_id },
            RefreshLookup::Valid { user_id }
        );
    }

    #[tokio::test]
    async fn lookup_fails_without_database() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy("postgres://localhost:1/none");
        let pool = pool.unwrap();
        let result = lookup_user(&pool, Uuid::new_v4()).await;
        assert!(result.is_err());
    }

    // The tests below exercise the conditional SQL against a real Postgres
    // with the schema from db/sql/ applied. They are skipped unless
    // CLAVIS_TEST_DSN points at such a database.
    async fn test_pool() -> Option<PgPool> {
        let dsn = std::env::var("CLAVIS_TEST_DSN").ok()?;
        sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&dsn)
            .await
            .ok()
    }

    async fn create_user(pool: &PgPool) -> UserRecord {
        let email = format!("{}@example.com", Uuid::new_v4());
        match insert_user(pool, "Test User", &email, "argon2-hash")
            .await
            .unwrap()
        {
            InsertUserOutcome::Created(user) => user,
            InsertUserOutcome::DuplicateEmail => panic!("random email collided"),
        }
    }

    #[tokio::test]
    async fn reset_token_is_consumed_on_first_use() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let user = create_user(&pool).await;
        let reset_hash = b"reset-hash".to_vec();
        let session_hash = b"session-hash".to_vec();

        store_reset_token(&pool, user.id, &reset_hash, 600).await.unwrap();
        insert_refresh_token(&pool, user.id, &session_hash, 600, None, None)
            .await
            .unwrap();

        assert!(
            consume_reset_token(&pool, &reset_hash, "new-argon2-hash")
                .await
                .unwrap()
        );

        // Consumption bumps the revocation counter and kills every session.
        let after = lookup_user(&pool, user.id).await.unwrap().unwrap();
        assert_eq!(after.token_version, user.token_version + 1);
        assert_eq!(
            lookup_refresh_token(&pool, &session_hash).await.unwrap(),
            RefreshLookup::Missing
        );

        // Second consumption finds no matching secret.
        assert!(
            !consume_reset_token(&pool, &reset_hash, "another-hash")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn rotation_invalidates_previous_sessions() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let user = create_user(&pool).await;
        let old_hash = b"old-session".to_vec();
        let new_hash = b"new-session".to_vec();

        insert_refresh_token(&pool, user.id, &old_hash, 600, None, None)
            .await
            .unwrap();
        rotate_refresh_tokens(&pool, user.id, &new_hash, 600, None, None)
            .await
            .unwrap();

        assert_eq!(
            lookup_refresh_token(&pool, &old_hash).await.unwrap(),
            RefreshLookup::Missing
        );
        assert_eq!(
            lookup_refresh_token(&pool, &new_hash).await.unwrap(),
            RefreshLookup::Valid { user_id: user.id }
        );
    }

    #[tokio::test]
    async fn expired_session_is_deleted_and_stays_gone() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let user = create_user(&pool).await;
        let hash = b"expired-session".to_vec();

        insert_refresh_token(&pool, user.id, &hash, -10, None, None)
            .await
            .unwrap();

        assert_eq!(
            lookup_refresh_token(&pool, &hash).await.unwrap(),
            RefreshLookup::Expired
        );
        // The expired row is gone; it cannot come back as valid.
        assert_eq!(
            lookup_refresh_token(&pool, &hash).await.unwrap(),
            RefreshLookup::Missing
        );
    }
}
