//! GitLab API error taxonomy.
//!
//! Expected API conditions (missing resources, insufficient roles,
//! plan-tier limitations) are distinct variants rather than generic
//! failures because they drive different report entries downstream.

use thiserror::Error;

/// Errors surfaced by the GitLab gateway and everything built on it.
#[derive(Debug, Error)]
pub enum GitLabError {
    /// The credential itself was rejected (401).
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Group or project identifier did not resolve (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// The authenticated user's role is too low (403, or a 400 whose
    /// message names a permission problem). Never retried or escalated;
    /// remediation is manual.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The endpoint exists but the instance's plan tier does not offer
    /// the feature (group webhooks below Premium).
    #[error("{0}")]
    FeatureUnavailable(String),

    /// Network-level or 5xx failure that survived the retry budget.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Any other non-success response.
    #[error("GitLab API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape.
    #[error("response decoding failed: {0}")]
    Deserialize(String),
}

impl GitLabError {
    /// Classify a non-success HTTP status and response body.
    ///
    /// 429 and 5xx never reach this point; the gateway handles both
    /// before classification.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = api_message(body);
        match status {
            401 => Self::Auth(message),
            403 => Self::PermissionDenied(message),
            400 if message.to_lowercase().contains("permission") => {
                Self::PermissionDenied(message)
            }
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }

    /// Whether fixing this error requires a human with a higher role.
    #[must_use]
    pub fn manual_action_required(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Pull the human-readable message out of a GitLab error body.
///
/// GitLab wraps errors as `{"message": ...}` or `{"error": ...}`; the
/// message value is sometimes a nested structure, so anything that is
/// not a plain string is re-serialized as-is. Falls back to the raw
/// body text.
#[must_use]
pub fn api_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|v| {
        v.get("message")
            .or_else(|| v.get("error"))
            .map(|m| match m.as_str() {
                Some(s) => s.to_string(),
                None => m.to_string(),
            })
    });
    message.unwrap_or_else(|| body.trim().to_string())
}
