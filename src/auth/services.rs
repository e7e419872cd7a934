use time::OffsetDateTime;
use tracing::{info, warn};

use super::{
    dto::Credentials,
    jwt::JwtKeys,
    password::{hash_password, spend_verify_cost, verify_password},
    repo_types::User,
};
use crate::{error::AppError, state::AppState};

/// Unknown username and wrong password share this response so callers cannot
/// tell which usernames exist.
const LOGIN_FAILED: &str = "record does not exist";

#[derive(Debug)]
pub struct Session {
    pub user: User,
    pub token: String,
    pub expires_at: OffsetDateTime,
}

fn require_credentials(creds: &Credentials) -> Result<(), AppError> {
    if creds.username.is_empty() || creds.password.is_empty() {
        return Err(AppError::validation(
            "both username and password are required",
        ));
    }
    Ok(())
}

pub async fn register(st: &AppState, creds: Credentials) -> Result<User, AppError> {
    require_credentials(&creds)?;

    let hash = hash_password(creds.password).await?;
    let user = st.store.create_user(&creds.username, &hash).await?;

    info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(user)
}

/// Verifies the credentials, then records the new token as the user's only
/// valid one.
pub async fn login(st: &AppState, keys: &JwtKeys, creds: Credentials) -> Result<Session, AppError> {
    if creds.username.is_empty() {
        return Err(AppError::validation("username is required"));
    }

    let Some(user) = st.store.find_user_by_username(&creds.username).await? else {
        // same Argon2 cost as a wrong password, so timing does not reveal
        // which usernames exist
        spend_verify_cost(creds.password).await;
        warn!(username = %creds.username, "login unknown username");
        return Err(AppError::not_found(LOGIN_FAILED));
    };

    if !verify_password(creds.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::not_found(LOGIN_FAILED));
    }

    let (token, expires_at) = keys.sign(user.id, &user.username)?;
    let token_id = st.store.rotate_token(user.id, &token).await?;

    info!(user_id = %user.id, username = %user.username, %token_id, "user logged in");
    Ok(Session {
        user,
        token,
        expires_at,
    })
}
