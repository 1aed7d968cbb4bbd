//! Password hashing with Argon2id.
//!
//! Hashing is CPU-bound, so both operations run on the blocking pool to
//! keep the async workers free.

use anyhow::{Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Hash a plaintext password into a PHC string.
///
/// # Errors
/// Returns an error if hashing fails or the blocking task panics.
pub async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| anyhow!("failed to hash password: {err}"))
    })
    .await?
}

/// Check a plaintext password against a stored PHC string.
///
/// # Errors
/// Returns an error if the stored hash is malformed or the blocking task
/// panics. A wrong password is `Ok(false)`, not an error.
pub async fn verify_password(password: String, password_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&password_hash)
            .map_err(|err| anyhow!("invalid password hash: {err}"))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_and_verify_round_trip() {
        let hash = hash_password("hunter2hunter2".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(
            verify_password("hunter2hunter2".to_string(), hash.clone())
                .await
                .unwrap()
        );
        assert!(
            !verify_password("wrong-password".to_string(), hash)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn same_password_hashes_differently() {
        let first = hash_password("secret-password".to_string()).await.unwrap();
        let second = hash_password("secret-password".to_string()).await.unwrap();
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        let result = verify_password("password".to_string(), "not-a-hash".to_string()).await;
        assert!(result.is_err());
    }
}
