use std::env;

use anyhow::Result;

/// Server settings sourced from the environment, with development
/// defaults for everything.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub database_path: String,
    pub upload_dir: String,
    pub secret_key: String,
    pub access_token_expire_minutes: i64,
    pub max_upload_size: usize,
}

impl ServerConfig {
    /// Create a new configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_path =
            env::var("DATABASE_PATH").unwrap_or_else(|_| "contextbase.db".to_string());
        let upload_dir = env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string());
        let secret_key =
            env::var("SECRET_KEY").unwrap_or_else(|_| "change-this-in-production".to_string());
        let access_token_expire_minutes = env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);
        let max_upload_size = env::var("MAX_UPLOAD_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50 * 1024 * 1024);

        Ok(ServerConfig {
            database_path,
            upload_dir,
            secret_key,
            access_token_expire_minutes,
            max_upload_size,
        })
    }
}
