//! Run report: everything the orchestrator did, skipped, or failed.
//!
//! The report is the only mutable state shared across a run. It is
//! appended to sequentially, serialized to JSON on request, and it is
//! the sole place newly created secrets are allowed to appear; they
//! never go to the log stream.

use std::fmt;

use serde::Serialize;

use crate::error::GitLabError;
use crate::types::Target;

/// Which operation an error entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    ResolveGroup,
    ResolveProject,
    EnsureToken,
    EnsureWebhook,
}

/// A newly created access token. `token_value` is the one-time secret;
/// this struct is its only home.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenCreated {
    pub target: Target,
    pub token_id: u64,
    pub token_name: String,
    pub token_value: String,
}

/// An already-present, non-revoked token that satisfied the requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenVerified {
    pub target: Target,
    pub token_id: u64,
    pub token_name: String,
}

/// A webhook create/update/unchanged record. `hook_id` is `None` for a
/// creation suppressed by dry-run mode.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEntry {
    pub target: Target,
    pub hook_id: Option<u64>,
    pub url: String,
}

/// A non-fatal failure, with enough context to remediate without a
/// verbose re-run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorEntry {
    /// `group:42`, `project:7`, or the raw identifier for resolution
    /// failures (`group:engineering`).
    pub target: String,
    pub operation: Operation,
    pub message: String,
    pub manual_action_required: bool,
}

impl ErrorEntry {
    /// Entry for a resolved target.
    pub fn for_target(target: Target, operation: Operation, error: &GitLabError) -> Self {
        Self {
            target: target.to_string(),
            operation,
            message: error.to_string(),
            manual_action_required: error.manual_action_required(),
        }
    }

    /// Entry for an identifier that never resolved.
    pub fn for_identifier(
        kind: &str,
        identifier: &str,
        operation: Operation,
        error: &GitLabError,
    ) -> Self {
        Self {
            target: format!("{kind}:{identifier}"),
            operation,
            message: error.to_string(),
            manual_action_required: error.manual_action_required(),
        }
    }
}

/// Per-root-group credential summary for the final disclosure step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub group_id: u64,
    pub group_path: String,
    /// Freshly created group token, shown exactly once. `None` when the
    /// token already existed or a shared personal token is in use.
    pub group_access_token: Option<String>,
    pub personal_access_token_used: bool,
    pub webhook_secret: String,
    pub webhook_secret_auto_generated: bool,
    pub webhook_url: String,
}

/// Per-project credential summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub project_id: u64,
    pub project_path: String,
    pub project_access_token: Option<String>,
    pub webhook_secret: String,
    pub webhook_url: String,
    pub covered_by_group_webhook: bool,
}

/// Outcome of one validation probe in check mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Warn => "WARN",
            CheckStatus::Fail => "FAIL",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    Authentication,
    Exists,
    Permissions,
    Coverage,
    TokenState,
    WebhookState,
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CheckName::Authentication => "authentication",
            CheckName::Exists => "exists",
            CheckName::Permissions => "permissions",
            CheckName::Coverage => "coverage",
            CheckName::TokenState => "token_state",
            CheckName::WebhookState => "webhook_state",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Auth,
    Group,
    Project,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    /// `auth`, `group:<identifier>`, or `project:<identifier>`.
    pub target: String,
    pub target_type: TargetType,
    pub check_name: CheckName,
    pub status: CheckStatus,
    pub message: String,
}

/// The run's accumulated outcome.
#[derive(Debug, Default, Serialize)]
pub struct ActionReport {
    pub tokens_created: Vec<TokenCreated>,
    pub tokens_verified: Vec<TokenVerified>,
    pub webhooks_created: Vec<WebhookEntry>,
    pub webhooks_updated: Vec<WebhookEntry>,
    pub webhooks_unchanged: Vec<WebhookEntry>,
    pub errors: Vec<ErrorEntry>,
    pub groups_processed: usize,
    pub groups_skipped: usize,
    pub projects_processed: usize,
    pub projects_skipped: usize,
    pub configuration_summary: Vec<GroupSummary>,
    pub project_configuration_summary: Vec<ProjectSummary>,
    pub check_results: Vec<CheckResult>,
}

impl ActionReport {
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Targets that made it all the way through apply mode.
    #[must_use]
    pub fn targets_processed(&self) -> usize {
        self.groups_processed + self.projects_processed
    }

    #[must_use]
    pub fn has_check_failures(&self) -> bool {
        self.check_results
            .iter()
            .any(|r| r.status == CheckStatus::Fail)
    }
}
