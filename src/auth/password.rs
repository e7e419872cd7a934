use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use tracing::error;

/// Argon2id with a fresh random salt. Runs on the blocking pool since a
/// single hash takes tens of milliseconds.
pub async fn hash_password(plain: String) -> anyhow::Result<String> {
    tokio::task::spawn_blocking(move || hash_password_sync(&plain)).await?
}

/// `Ok(false)` for a mismatch; `Err` only when `hash` is not a PHC string.
pub async fn verify_password(plain: String, hash: String) -> anyhow::Result<bool> {
    tokio::task::spawn_blocking(move || verify_password_sync(&plain, &hash)).await?
}

/// Burns the same Argon2 work a `verify_password` call costs, for callers
/// that have no stored hash to check against.
pub async fn spend_verify_cost(plain: String) {
    if let Err(e) = tokio::task::spawn_blocking(move || hash_password_sync(&plain)).await {
        error!(error = %e, "argon2 filler task failed");
    }
}

fn hash_password_sync(plain: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| {
            error!(error = %e, "argon2 hash_password error");
            anyhow::anyhow!(e.to_string())
        })?
        .to_string();
    Ok(hash)
}

fn verify_password_sync(plain: &str, hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!(error = %e, "argon2 parse hash error");
        anyhow::anyhow!(e.to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(plain.as_bytes(), &parsed)
        .is_ok())
}
