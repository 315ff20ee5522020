//! Application configuration parsed from environment variables.
//!
//! The upload and OAuth values are opaque to the session core; they are
//! carried so every shell reads its configuration from one place.

use std::path::PathBuf;
use std::time::Duration;

use crate::loader::RetryPolicy;

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000/api";
pub const DEFAULT_TOKEN_PATH: &str = ".medportal/session.json";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_LOADER_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_LOADER_RETRY_BASE_MS: u64 = 200;
pub const DEFAULT_LOADER_RETRY_MAX_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("MEDPORTAL_API_BASE_URL must not be empty")]
    EmptyApiBaseUrl,
    #[error("api base url must start with http:// or https://, got {0}")]
    InvalidApiBaseUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

/// File-upload provider credentials, passed through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadConfig {
    pub cloud_name: String,
    pub upload_preset: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub api_base_url: String,
    pub oauth_client_id: String,
    pub upload: UploadConfig,
    pub token_path: PathBuf,
    pub timeouts: HttpTimeouts,
    /// Age after which a cached user is revalidated. `None` keeps it forever.
    pub cache_max_stale: Option<Duration>,
    pub loader: RetryPolicy,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Optional (defaults in parentheses):
    /// - `MEDPORTAL_API_BASE_URL` (`http://127.0.0.1:5000/api`)
    /// - `MEDPORTAL_OAUTH_CLIENT_ID`, `MEDPORTAL_UPLOAD_CLOUD_NAME`, `MEDPORTAL_UPLOAD_PRESET` (empty)
    /// - `MEDPORTAL_TOKEN_PATH` (`.medportal/session.json`)
    /// - `MEDPORTAL_REQUEST_TIMEOUT_SECS` (15), `MEDPORTAL_CONNECT_TIMEOUT_SECS` (5)
    /// - `MEDPORTAL_CACHE_MAX_STALE_SECS` (unset: cached users never go stale)
    /// - `MEDPORTAL_LOADER_MAX_ATTEMPTS` (3), `MEDPORTAL_LOADER_RETRY_BASE_MS` (200)
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL is empty or not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] but reads values through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if the API base URL is empty or not http(s).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = normalize_base_url(
            lookup("MEDPORTAL_API_BASE_URL")
                .as_deref()
                .unwrap_or(DEFAULT_API_BASE_URL),
        )?;
        let text = |key: &str| lookup(key).map(|v| v.trim().to_owned()).unwrap_or_default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let token_path = lookup("MEDPORTAL_TOKEN_PATH")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_TOKEN_PATH), PathBuf::from);

        let timeouts = HttpTimeouts {
            request_secs: parsed("MEDPORTAL_REQUEST_TIMEOUT_SECS").unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            connect_secs: parsed("MEDPORTAL_CONNECT_TIMEOUT_SECS").unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS),
        };

        let max_attempts = lookup("MEDPORTAL_LOADER_MAX_ATTEMPTS")
            .and_then(|v| v.trim().parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LOADER_MAX_ATTEMPTS);
        let loader = RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(
                parsed("MEDPORTAL_LOADER_RETRY_BASE_MS").unwrap_or(DEFAULT_LOADER_RETRY_BASE_MS),
            ),
            max_delay: Duration::from_millis(DEFAULT_LOADER_RETRY_MAX_MS),
        };

        Ok(Self {
            api_base_url,
            oauth_client_id: text("MEDPORTAL_OAUTH_CLIENT_ID"),
            upload: UploadConfig {
                cloud_name: text("MEDPORTAL_UPLOAD_CLOUD_NAME"),
                upload_preset: text("MEDPORTAL_UPLOAD_PRESET"),
            },
            token_path,
            timeouts,
            cache_max_stale: parsed("MEDPORTAL_CACHE_MAX_STALE_SECS").map(Duration::from_secs),
            loader,
        })
    }
}

/// Trim whitespace and trailing slashes; reject empty or non-http(s) URLs.
///
/// # Errors
///
/// Returns an error if the URL is empty or not http(s).
pub fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::EmptyApiBaseUrl);
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::InvalidApiBaseUrl(trimmed.to_owned()));
    }
    Ok(trimmed.to_owned())
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
