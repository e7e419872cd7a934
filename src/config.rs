use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

/// Bearer verification settings. With `enabled = false` the bearer check is
/// skipped and only the ownership chain decides access (local/demo mode).
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub enabled: bool,
    pub jwt: JwtConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub public_host: String,
    pub access_key: String,
    pub secret_key: String,
    pub timeout_secs: u64,
}

impl S3Config {
    /// Public base URL of the bucket, always ending with `/`.
    pub fn bucket_url(&self) -> String {
        format!("https://{}.{}/", self.bucket, self.public_host)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_enabled: bool,
    pub request_timeout_secs: u64,
    pub upload_max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub s3: S3Config,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let server = ServerConfig {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT", 8080),
            cors_enabled: env_flag("CORS_ENABLED", true),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", 60),
            upload_max_bytes: env_parse("UPLOAD_MAX_BYTES", 20 * 1024 * 1024),
        };

        let auth = AuthConfig {
            enabled: env_flag("AUTH_ENABLED", true),
            jwt: JwtConfig {
                secret: std::env::var("JWT_SECRET").context("JWT_SECRET")?,
                issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "pyvinci".into()),
                audience: std::env::var("JWT_AUDIENCE")
                    .unwrap_or_else(|_| "pyvinci-users".into()),
                ttl_minutes: env_parse("JWT_TTL_MINUTES", 60 * 24 * 365),
            },
        };

        let s3 = S3Config {
            bucket: std::env::var("S3_BUCKET").context("S3_BUCKET")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
            endpoint: std::env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            public_host: std::env::var("S3_PUBLIC_HOST")
                .unwrap_or_else(|_| "s3.amazonaws.com".into()),
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY")?,
            timeout_secs: env_parse("STORAGE_TIMEOUT_SECS", 30),
        };

        Ok(Self {
            database_url,
            db_max_connections: env_parse("DB_MAX_CONNECTIONS", 10),
            db_acquire_timeout_secs: env_parse("DB_ACQUIRE_TIMEOUT_SECS", 5),
            server,
            auth,
            s3,
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .and_then(|v| parse_flag(&v))
        .unwrap_or(default)
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
