use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

const DEFAULT_UPLOAD_MAX_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub upload_dir: PathBuf,
    pub upload_max_bytes: usize,
    pub max_page_size: u32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("AGORA_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("AGORA_JWT_SECRET is unset or still a placeholder; it must match the identity provider's secret");
        }

        let host = var("AGORA_HOST", "0.0.0.0");
        let port: u16 = var("AGORA_PORT", "3000")
            .parse()
            .context("AGORA_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let upload_max_bytes = match lookup("AGORA_UPLOAD_MAX_BYTES") {
            Some(v) => v.parse().context("AGORA_UPLOAD_MAX_BYTES must be a byte count")?,
            None => DEFAULT_UPLOAD_MAX_BYTES,
        };
        let max_page_size = match lookup("AGORA_MAX_PAGE_SIZE") {
            Some(v) => v.parse().context("AGORA_MAX_PAGE_SIZE must be a positive integer")?,
            None => DEFAULT_MAX_PAGE_SIZE,
        };

        Ok(Self {
            addr,
            db_path: var("AGORA_DB_PATH", "agora.db").into(),
            jwt_secret,
            upload_dir: var("AGORA_UPLOAD_DIR", "./uploads").into(),
            upload_max_bytes,
            max_page_size,
        })
    }
}
