//! Desired-state configuration.
//!
//! The file format (YAML) and its loading live in the CLI crate; this
//! module owns the deserialized shape and its validation.

use serde::Deserialize;
use thiserror::Error;

fn default_log_level() -> String {
    "info".to_string()
}

fn default_token_expiry_days() -> i64 {
    365
}

/// How the integration authenticates against the provisioned targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// One shared personal access token supplied out-of-band; no
    /// per-target tokens are ever created.
    BotUserPat,
    /// A dedicated access token is provisioned on every root group and
    /// project.
    GroupTokenPerRootGroup,
}

/// Webhook template: where events go, and the shared secret.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    /// Receiver endpoint for merge-request and comment events.
    pub merge_request_url: String,
    /// Shared secret for signature verification. Auto-generated once
    /// per run when absent.
    #[serde(default)]
    pub secret_token: Option<String>,
}

/// Main configuration, immutable for the duration of a run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub gitlab_base_url: String,
    pub auth_mode: AuthMode,
    pub webhooks: WebhookConfig,
    /// Group paths or numeric IDs. Processed exactly as named; no
    /// subgroup discovery.
    #[serde(default)]
    pub root_groups: Vec<String>,
    /// Project paths or numeric IDs.
    #[serde(default)]
    pub projects: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_token_expiry_days")]
    pub token_expires_in_days: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("gitlab_base_url must not be empty")]
    MissingBaseUrl,

    #[error("configuration must name at least one root group or project")]
    NoTargets,
}

impl Config {
    /// Check the run-level invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gitlab_base_url.trim().is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        if self.root_groups.is_empty() && self.projects.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        Ok(())
    }
}
