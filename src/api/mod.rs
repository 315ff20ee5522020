//! Profile API client.
//!
//! The session store only needs one call, `GET /profile`, so the seam is a
//! single-method async trait. `HttpProfileClient` is the real implementation;
//! tests script the trait directly.
//!
//! ERROR HANDLING
//! ==============
//! Timeouts and transport failures are kept distinct from status errors so
//! the coordinator can tell "the network hiccupped" from "the token is dead".

pub mod types;

pub use types::{ApiError, User, parse_profile};

use std::time::Duration;

use async_trait::async_trait;

use crate::config::{AppConfig, HttpTimeouts};

/// The remote profile collaborator.
#[async_trait]
pub trait ProfileApi: Send + Sync {
    /// Fetch the profile for the bearer of `token`.
    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError>;
}

// =============================================================================
// HTTP CLIENT
// =============================================================================

pub struct HttpProfileClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpProfileClient {
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: &str, timeouts: HttpTimeouts) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| ApiError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url: base_url.trim_end_matches('/').to_owned() })
    }

    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn from_config(config: &AppConfig) -> Result<Self, ApiError> {
        Self::new(&config.api_base_url, config.timeouts)
    }

    #[must_use]
    pub fn profile_url(&self) -> String {
        format!("{}/profile", self.base_url)
    }
}

#[async_trait]
impl ProfileApi for HttpProfileClient {
    async fn fetch_profile(&self, token: &str) -> Result<User, ApiError> {
        let response = self
            .http
            .get(self.profile_url())
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, text));
        }

        parse_profile(&text)
    }
}

fn transport_error(e: reqwest::Error) -> ApiError {
    if e.is_timeout() { ApiError::Timeout } else { ApiError::Network(e.to_string()) }
}

#[cfg(test)]
#[path = "scripted_test.rs"]
pub(crate) mod test_helpers;
