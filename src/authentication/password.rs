//! Argon2id password hashing
//!
//! Both hashing and verification are CPU bound and run on the blocking pool.

use crate::errors::AppError;
use argon2::password_hash::{Error as HashError, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};

const MEMORY_KIB: u32 = 15_000;
const ITERATIONS: u32 = 2;

#[derive(thiserror::Error, Debug)]
pub enum PasswordError {
    #[error("Password does not match")]
    Mismatch,
    #[error("Stored password hash is malformed")]
    MalformedHash(#[source] HashError),
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl From<PasswordError> for AppError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::Mismatch => AppError::unauthorized("Invalid user credentials"),
            PasswordError::MalformedHash(e) => {
                AppError::Unexpected(anyhow::anyhow!(e).context("Unreadable password hash"))
            }
            PasswordError::Unexpected(e) => AppError::Unexpected(e),
        }
    }
}

fn hasher() -> Result<Argon2<'static>, PasswordError> {
    let params = Params::new(MEMORY_KIB, ITERATIONS, 1, None)
        .map_err(|e| anyhow::anyhow!(e).context("Invalid Argon2 parameters"))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Checks `candidate` against a PHC-format hash.
pub fn verify_password_hash(expected: &str, candidate: &str) -> Result<(), PasswordError> {
    let parsed = PasswordHash::new(expected).map_err(PasswordError::MalformedHash)?;
    match Argon2::default().verify_password(candidate.as_bytes(), &parsed) {
        Ok(()) => Ok(()),
        Err(HashError::Password) => Err(PasswordError::Mismatch),
        Err(e) => Err(PasswordError::MalformedHash(e)),
    }
}

#[tracing::instrument(name = "Check password", skip_all)]
pub async fn check_password(expected: String, candidate: String) -> Result<(), PasswordError> {
    let outcome = tokio::task::spawn_blocking(move || verify_password_hash(&expected, &candidate))
        .await
        .map_err(|e| anyhow::Error::new(e).context("Password check task panicked"))?;

    if let Err(ref e) = outcome {
        tracing::warn!("Password check failed: {}", e);
    }
    outcome
}

#[tracing::instrument(name = "Compute password hash", skip_all)]
pub async fn compute_password_hash(password: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || -> Result<String, PasswordError> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        let hash = hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!(e).context("Failed to hash password"))?;
        Ok(hash.to_string())
    })
    .await
    .map_err(|e| anyhow::Error::new(e).context("Hashing task panicked"))??;

    tracing::debug!("Password hash computed");
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_then_check() {
        let hash = compute_password_hash("hunter22".to_string()).await.unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(check_password(hash, "hunter22".to_string()).await.is_ok());
    }

    #[tokio::test]
    async fn wrong_password_is_a_mismatch() {
        let hash = compute_password_hash("hunter22".to_string()).await.unwrap();
        let err = check_password(hash, "hunter23".to_string()).await.unwrap_err();
        assert!(matches!(err, PasswordError::Mismatch));
        assert_eq!(AppError::from(err).status_code(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn garbage_hash_is_malformed() {
        let err = verify_password_hash("not-a-phc-string", "whatever").unwrap_err();
        assert!(matches!(err, PasswordError::MalformedHash(_)));
    }
}
