//! Typed GitLab API records.
//!
//! Only the fields the reconcilers actually read are modeled; decoding
//! happens once at the gateway boundary so nothing downstream touches
//! raw JSON maps.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A GitLab group, as returned by the groups endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub id: u64,
    pub name: String,
    /// Path segment (slug), e.g. `"backend"`.
    pub path: String,
    /// Full path including ancestors, e.g. `"eng/backend"`.
    pub full_path: String,
}

/// A GitLab project.
#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub id: u64,
    pub path_with_namespace: String,
    pub namespace: Namespace,
}

/// The namespace a project lives in (group or user).
#[derive(Debug, Clone, Deserialize)]
pub struct Namespace {
    pub id: u64,
    pub full_path: String,
    /// `"group"` or `"user"`.
    #[serde(default)]
    pub kind: String,
}

/// A group or project access token.
///
/// `token` carries the secret value and is only present in the response
/// to the creation call; list endpoints never return it.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessToken {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub revoked: bool,
    #[serde(default)]
    pub expires_at: Option<NaiveDate>,
    #[serde(default)]
    pub token: Option<String>,
}

/// A group or project webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct Webhook {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub push_events: bool,
    #[serde(default)]
    pub merge_requests_events: bool,
    #[serde(default)]
    pub note_events: bool,
    #[serde(default)]
    pub pipeline_events: bool,
    #[serde(default)]
    pub enable_ssl_verification: bool,
    /// The shared secret. GitLab omits it from list responses, in which
    /// case the reconciler treats the hook as out of date.
    #[serde(default)]
    pub token: Option<String>,
}

/// The authenticated user, used for the startup auth probe.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The two kinds of provisioning target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Group,
    Project,
}

impl ResourceKind {
    /// API path segment: `groups` or `projects`.
    #[must_use]
    pub fn path_segment(self) -> &'static str {
        match self {
            ResourceKind::Group => "groups",
            ResourceKind::Project => "projects",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Group => "group",
            ResourceKind::Project => "project",
        }
    }
}

/// A resolved provisioning target: a group or project with a known ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Target {
    pub kind: ResourceKind,
    pub id: u64,
}

impl Target {
    #[must_use]
    pub fn group(id: u64) -> Self {
        Self {
            kind: ResourceKind::Group,
            id,
        }
    }

    #[must_use]
    pub fn project(id: u64) -> Self {
        Self {
            kind: ResourceKind::Project,
            id,
        }
    }

    /// Endpoint listing (and creating) access tokens for this target.
    #[must_use]
    pub fn access_tokens_endpoint(&self) -> String {
        format!("/api/v4/{}/{}/access_tokens", self.kind.path_segment(), self.id)
    }

    /// Endpoint listing (and creating) webhooks for this target.
    #[must_use]
    pub fn hooks_endpoint(&self) -> String {
        format!("/api/v4/{}/{}/hooks", self.kind.path_segment(), self.id)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}
