// src/config.rs
use std::net::IpAddr;
use std::path::PathBuf;

/// Runtime settings read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    /// Postgres document store; the in-memory store is used when absent.
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    /// bcrypt hash of the admin password; admin login is disabled when absent.
    pub admin_password_hash: Option<String>,
    pub upload_dir: PathBuf,
    pub public_base_url: String,
    pub cors_allow_origin: Option<String>,
}

pub const BASE_PATH: &str = "/shopmap";

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        let host = non_empty("HOST")
            .and_then(|h| h.parse::<IpAddr>().ok())
            .unwrap_or(IpAddr::from([127, 0, 0, 1]));
        let port = non_empty("PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let public_base_url = non_empty("PUBLIC_BASE_URL")
            .unwrap_or_else(|| format!("http://{host}:{port}{BASE_PATH}"));

        Self {
            host,
            port,
            database_url: non_empty("DATABASE_URL"),
            jwt_secret: non_empty("JWT_SECRET"),
            admin_password_hash: non_empty("ADMIN_PASSWORD_HASH"),
            upload_dir: non_empty("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./uploads")),
            public_base_url,
            cors_allow_origin: non_empty("CORS_ALLOW_ORIGIN"),
        }
    }

    #[cfg(test)]
    /// Settings for tests without any environment.
    pub fn local() -> Self {
        Self {
            host: IpAddr::from([127, 0, 0, 1]),
            port: 3000,
            database_url: None,
            jwt_secret: None,
            admin_password_hash: None,
            upload_dir: PathBuf::from("./uploads"),
            public_base_url: format!("http://127.0.0.1:3000{BASE_PATH}"),
            cors_allow_origin: None,
        }
    }
}
