use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::instrument;

use crate::{
    auth::{
        dto::{Credentials, LoginResponse, PublicUser},
        jwt::JwtKeys,
        services,
    },
    error::AppError,
    extract::AppJson,
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Credentials>,
) -> Result<(StatusCode, Json<PublicUser>), AppError> {
    let user = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<Credentials>,
) -> Result<Json<LoginResponse>, AppError> {
    let keys = JwtKeys::from_ref(&state);
    let session = services::login(&state, &keys, payload).await?;
    Ok(Json(LoginResponse {
        user: session.user.into(),
        token: session.token,
        expire_at: session.expires_at,
    }))
}
