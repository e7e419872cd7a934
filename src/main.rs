mod app;
mod auth;
mod config;
mod error;
mod extract;
mod images;
mod projects;
mod state;
mod storage;
mod store;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "pyvinci=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = AppConfig::from_env()?;
    let server = config.server.clone();
    tracing::info!(
        auth_enabled = config.auth.enabled,
        cors_enabled = server.cors_enabled,
        bucket = %config.s3.bucket,
        "configuration loaded"
    );

    let state = AppState::init(config).await?;
    let app = app::build_app(state);
    app::serve(app, &server).await
}
