//! Profile API wire types and errors.
//!
//! DESIGN
//! ======
//! The profile endpoint has answered with both `{ "user": {...} }` and the
//! bare user object over time, so decoding accepts either shape and
//! normalizes to one `User`. Ids arrive as strings or numbers (and sometimes
//! as `_id`); they are always stored as strings.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::role::Role;

// =============================================================================
// ERROR
// =============================================================================

/// Errors produced by profile API calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    /// The API rejected the session token (401/403).
    #[error("profile request unauthorized: status {status}")]
    Unauthorized { status: u16 },

    /// Any other non-success HTTP status.
    #[error("profile request failed: status {status}")]
    Status { status: u16, body: String },

    /// Transport-level failure (DNS, connect, reset).
    #[error("network error: {0}")]
    Network(String),

    /// The request exceeded its deadline.
    #[error("profile request timed out")]
    Timeout,

    /// The response body was not a recognizable profile.
    #[error("profile response parse failed: {0}")]
    Parse(String),

    /// The caller cancelled the request before it completed.
    #[error("profile request cancelled")]
    Cancelled,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl ApiError {
    /// Classify a non-success status code.
    #[must_use]
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized { status },
            _ => Self::Status { status, body },
        }
    }

    /// True when the token itself was rejected and the session must end.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }

    /// Failures another attempt could plausibly fix.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Stable machine-readable code for logs and CLI output.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Status { .. } => "E_STATUS",
            Self::Network(_) => "E_NETWORK",
            Self::Timeout => "E_TIMEOUT",
            Self::Parse(_) => "E_PARSE",
            Self::Cancelled => "E_CANCELLED",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }
}

// =============================================================================
// USER RECORD
// =============================================================================

/// Normalized user record, the source of truth for role gating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(alias = "_id", deserialize_with = "deserialize_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub email: String,
    /// Role-specific profile payload; opaque to the session core.
    #[serde(default = "empty_profile")]
    pub profile: serde_json::Value,
}

fn empty_profile() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::String(s) if !s.trim().is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        _ => Err(D::Error::custom("expected non-empty string or number id")),
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

#[derive(Deserialize)]
#[serde(untagged)]
enum ProfileEnvelope {
    Wrapped { user: User },
    Bare(User),
}

/// Decode a profile response body in either supported shape.
pub fn parse_profile(body: &str) -> Result<User, ApiError> {
    let envelope: ProfileEnvelope = serde_json::from_str(body).map_err(|e| ApiError::Parse(e.to_string()))?;
    Ok(match envelope {
        ProfileEnvelope::Wrapped { user } | ProfileEnvelope::Bare(user) => user,
    })
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
