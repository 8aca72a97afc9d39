use anyhow::{anyhow, Context, Result};
use secrecy::Secret;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATABASE_URL: &str = "sqlite://vidtube.db?mode=rwc";
pub const DEFAULT_CLOUDINARY_BASE_URL: &str = "https://api.cloudinary.com";
pub const DEFAULT_UPLOAD_TEMP_DIR: &str = "./public/temp";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct TokenSettings {
    pub secret: Secret<String>,
    pub expiry: Duration,
}

#[derive(Debug, Clone)]
pub struct CloudinarySettings {
    pub base_url: String,
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub database_url: String,
    pub cors_origin: Option<String>,
    pub access_token: TokenSettings,
    pub refresh_token: TokenSettings,
    pub cloudinary: CloudinarySettings,
    pub upload_temp_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub cookie_secure: bool,
}

impl AppConfig {
    /// Reads the process environment. Call `dotenv::dotenv()` first to pick up `.env`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("{} must be set", key))
        };

        let port = match lookup("PORT") {
            Some(value) => value
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT is not a valid port: {}", value))?,
            None => DEFAULT_PORT,
        };

        let access_token = TokenSettings {
            secret: Secret::new(required("ACCESS_TOKEN_SECRET")?),
            expiry: parse_expiry(&lookup("ACCESS_TOKEN_EXPIRY").unwrap_or_else(|| "1d".into()))
                .context("ACCESS_TOKEN_EXPIRY is invalid")?,
        };
        let refresh_token = TokenSettings {
            secret: Secret::new(required("REFRESH_TOKEN_SECRET")?),
            expiry: parse_expiry(&lookup("REFRESH_TOKEN_EXPIRY").unwrap_or_else(|| "10d".into()))
                .context("REFRESH_TOKEN_EXPIRY is invalid")?,
        };

        let cloudinary = CloudinarySettings {
            base_url: lookup("CLOUDINARY_BASE_URL")
                .unwrap_or_else(|| DEFAULT_CLOUDINARY_BASE_URL.to_string()),
            cloud_name: required("CLOUDINARY_CLOUD_NAME")?,
            api_key: required("CLOUDINARY_API_KEY")?,
            api_secret: Secret::new(required("CLOUDINARY_API_SECRET")?),
        };

        let max_upload_bytes = match lookup("MAX_UPLOAD_BYTES") {
            Some(value) => value
                .trim()
                .parse::<usize>()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a number: {}", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let cookie_secure = lookup("COOKIE_SECURE")
            .map(|value| !matches!(value.trim().to_lowercase().as_str(), "false" | "0" | "no"))
            .unwrap_or(true);

        Ok(Self {
            port,
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            cors_origin: lookup("CORS_ORIGIN").filter(|value| !value.trim().is_empty()),
            access_token,
            refresh_token,
            cloudinary,
            upload_temp_dir: PathBuf::from(
                lookup("UPLOAD_TEMP_DIR").unwrap_or_else(|| DEFAULT_UPLOAD_TEMP_DIR.to_string()),
            ),
            max_upload_bytes,
            cookie_secure,
        })
    }
}

/// Parses `<n>` (seconds) or `<n>s|m|h|d`.
pub fn parse_expiry(raw: &str) -> Result<Duration> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(anyhow!("empty expiry"));
    }

    let (digits, multiplier) = match value.chars().last() {
        Some('s') => (&value[..value.len() - 1], 1),
        Some('m') => (&value[..value.len() - 1], 60),
        Some('h') => (&value[..value.len() - 1], 60 * 60),
        Some('d') => (&value[..value.len() - 1], 24 * 60 * 60),
        _ => (value, 1),
    };

    let amount: u64 = digits
        .trim()
        .parse()
        .with_context(|| format!("invalid expiry: {}", raw))?;
    if amount == 0 {
        return Err(anyhow!("expiry must be positive: {}", raw));
    }
    Ok(Duration::from_secs(amount * multiplier))
}
