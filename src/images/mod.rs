mod dto;
pub mod handlers;
pub mod repo_types;
pub mod services;

use crate::state::AppState;
use axum::{extract::DefaultBodyLimit, Router};

/// Image routes. `upload_limit` caps the whole multipart body.
pub fn router(upload_limit: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::image_routes())
        .layer(DefaultBodyLimit::max(upload_limit))
}
