//! Run orchestration: apply and check modes.
//!
//! Targets are processed strictly sequentially: every root group is
//! resolved and reconciled before the next, then every project. A
//! failure aborts only its own target; the run carries on and the
//! report keeps the context needed for remediation.

use std::collections::HashSet;

use crate::config::{AuthMode, Config};
use crate::gateway::GitLabClient;
use crate::report::{
    ActionReport, CheckName, CheckResult, CheckStatus, ErrorEntry, GroupSummary, Operation,
    ProjectSummary, TargetType,
};
use crate::resolve;
use crate::token::{self, find_valid_token};
use crate::types::{AccessToken, Group, Project, Target, User, Webhook};
use crate::webhook::{self, DesiredHook, GROUP_HOOKS_UNAVAILABLE};
use crate::error::GitLabError;

/// Process exit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// Apply or check completed with nothing to report.
    Success,
    /// Check mode found at least one failing probe.
    ChecksFailed,
    /// Apply hit errors but at least one target was fully processed.
    Partial,
    /// Authentication failed, or no target succeeded.
    Fatal,
}

impl ExitStatus {
    #[must_use]
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => 0,
            ExitStatus::ChecksFailed => 1,
            ExitStatus::Partial => 2,
            ExitStatus::Fatal => 3,
        }
    }
}

/// Drives a full provisioning or validation run and owns the report
/// for its duration.
pub struct Provisioner {
    client: GitLabClient,
    config: Config,
    webhook_secret: String,
    webhook_secret_auto_generated: bool,
    report: ActionReport,
}

impl Provisioner {
    /// Build a provisioner. When the configuration carries no webhook
    /// secret, one is generated here, once, for the whole run.
    pub fn new(config: Config, client: GitLabClient) -> Self {
        let (webhook_secret, webhook_secret_auto_generated) = match &config.webhooks.secret_token {
            Some(secret) => (secret.clone(), false),
            None => {
                tracing::info!("no webhook secret configured, generated one for this run");
                (webhook::generate_webhook_secret(), true)
            }
        };

        Self {
            client,
            config,
            webhook_secret,
            webhook_secret_auto_generated,
            report: ActionReport::default(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn report(&self) -> &ActionReport {
        &self.report
    }

    fn desired_hook(&self) -> DesiredHook {
        DesiredHook::from_template(&self.config.webhooks.merge_request_url, &self.webhook_secret)
    }

    /// Confirm the credential works before touching anything.
    async fn verify_auth(&self) -> bool {
        match self.client.get::<User>("/api/v4/user").await {
            Ok(user) => {
                tracing::info!(username = %user.username, "authenticated");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "authentication failed");
                false
            }
        }
    }

    /// Apply mode: converge every configured root group and project.
    pub async fn run(&mut self) -> ExitStatus {
        tracing::info!(
            groups = self.config.root_groups.len(),
            projects = self.config.projects.len(),
            dry_run = self.config.dry_run,
            "starting provisioning run"
        );

        if !self.verify_auth().await {
            return ExitStatus::Fatal;
        }

        // Root groups are processed exactly as named; no subgroup
        // discovery.
        let mut configured_group_ids: HashSet<u64> = HashSet::new();
        let root_groups = self.config.root_groups.clone();
        for entry in &root_groups {
            tracing::info!(group = %entry, "processing root group");

            let group_id = match resolve::resolve_group(&self.client, entry).await {
                Ok(id) => id,
                Err(e) => {
                    tracing::error!(group = %entry, error = %e, "failed to resolve group");
                    self.report.groups_skipped += 1;
                    self.report.errors.push(ErrorEntry::for_identifier(
                        "group",
                        entry,
                        Operation::ResolveGroup,
                        &e,
                    ));
                    continue;
                }
            };
            configured_group_ids.insert(group_id);

            let created_token = if self.config.auth_mode == AuthMode::GroupTokenPerRootGroup {
                token::ensure_token(
                    &self.client,
                    &self.config,
                    Target::group(group_id),
                    &mut self.report,
                )
                .await
            } else {
                None
            };

            self.build_group_summary(group_id, created_token).await;
            self.process_group(group_id).await;
        }

        if !self.config.projects.is_empty() {
            tracing::info!("processing individual projects");
            let projects = self.config.projects.clone();
            for entry in &projects {
                self.process_project(entry, &configured_group_ids).await;
            }
        }

        let status = self.exit_status();
        tracing::info!(
            groups_processed = self.report.groups_processed,
            projects_processed = self.report.projects_processed,
            errors = self.report.errors.len(),
            exit_code = status.code(),
            "provisioning run finished"
        );
        status
    }

    async fn process_group(&mut self, group_id: u64) -> bool {
        let desired = self.desired_hook();
        let ok = webhook::ensure_webhook(
            &self.client,
            Target::group(group_id),
            &desired,
            &mut self.report,
        )
        .await;
        self.report.groups_processed += 1;
        ok
    }

    async fn process_project(&mut self, entry: &str, configured_group_ids: &HashSet<u64>) {
        tracing::info!(project = %entry, "processing project");

        let project_id = match resolve::resolve_project(&self.client, entry).await {
            Ok(id) => id,
            Err(e) => {
                tracing::error!(project = %entry, error = %e, "failed to resolve project");
                self.report.projects_skipped += 1;
                self.report.errors.push(ErrorEntry::for_identifier(
                    "project",
                    entry,
                    Operation::ResolveProject,
                    &e,
                ));
                return;
            }
        };

        // Coverage is informational: a parent group's webhook already
        // reaches this project, but project-level provisioning still
        // happens.
        let covering_group =
            resolve::find_covering_group(&self.client, project_id, configured_group_ids).await;
        if let Some(group_id) = covering_group {
            tracing::warn!(
                project = %entry,
                group_id,
                "project is already covered by a group webhook; provisioning it anyway"
            );
        }

        let created_token = token::ensure_token(
            &self.client,
            &self.config,
            Target::project(project_id),
            &mut self.report,
        )
        .await;

        let desired = self.desired_hook();
        let webhook_ok = webhook::ensure_webhook(
            &self.client,
            Target::project(project_id),
            &desired,
            &mut self.report,
        )
        .await;

        if webhook_ok {
            self.build_project_summary(project_id, created_token, covering_group.is_some())
                .await;
            self.report.projects_processed += 1;
        } else {
            self.report.projects_skipped += 1;
        }
    }

    async fn build_group_summary(&mut self, group_id: u64, created_token: Option<String>) {
        let details: Group = match self.client.get(&format!("/api/v4/groups/{group_id}")).await {
            Ok(g) => g,
            Err(e) => {
                tracing::warn!(group_id, error = %e, "failed to fetch group details for summary");
                return;
            }
        };

        let using_pat = self.config.auth_mode == AuthMode::BotUserPat;
        self.report.configuration_summary.push(GroupSummary {
            group_id,
            group_path: details.full_path,
            group_access_token: if using_pat { None } else { created_token },
            personal_access_token_used: using_pat,
            webhook_secret: self.webhook_secret.clone(),
            webhook_secret_auto_generated: self.webhook_secret_auto_generated,
            webhook_url: self.config.webhooks.merge_request_url.clone(),
        });
    }

    async fn build_project_summary(
        &mut self,
        project_id: u64,
        created_token: Option<String>,
        covered_by_group_webhook: bool,
    ) {
        let details: Project = match self
            .client
            .get(&format!("/api/v4/projects/{project_id}"))
            .await
        {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(project_id, error = %e, "failed to fetch project details for summary");
                return;
            }
        };

        self.report
            .project_configuration_summary
            .push(ProjectSummary {
                project_id,
                project_path: details.path_with_namespace,
                project_access_token: created_token,
                webhook_secret: self.webhook_secret.clone(),
                webhook_url: self.config.webhooks.merge_request_url.clone(),
                covered_by_group_webhook,
            });
    }

    fn exit_status(&self) -> ExitStatus {
        if !self.report.has_errors() {
            ExitStatus::Success
        } else if self.report.targets_processed() > 0 {
            ExitStatus::Partial
        } else {
            ExitStatus::Fatal
        }
    }

    /// Check mode: validate the configuration and remote state without
    /// creating or modifying anything.
    pub async fn run_checks(&mut self) -> ExitStatus {
        let mut results: Vec<CheckResult> = Vec::new();

        match self.client.get::<User>("/api/v4/user").await {
            Ok(user) => results.push(CheckResult {
                target: "auth".to_string(),
                target_type: TargetType::Auth,
                check_name: CheckName::Authentication,
                status: CheckStatus::Pass,
                message: format!("authenticated as {}", user.username),
            }),
            Err(e) => {
                results.push(CheckResult {
                    target: "auth".to_string(),
                    target_type: TargetType::Auth,
                    check_name: CheckName::Authentication,
                    status: CheckStatus::Fail,
                    message: format!("authentication failed: {e}"),
                });
                self.report.check_results = results;
                return ExitStatus::ChecksFailed;
            }
        }

        let mut configured_group_ids: HashSet<u64> = HashSet::new();
        let root_groups = self.config.root_groups.clone();
        for entry in &root_groups {
            let target = format!("group:{entry}");

            let group_id = match resolve::resolve_group(&self.client, entry).await {
                Ok(id) => id,
                Err(_) => {
                    results.push(group_check(
                        &target,
                        CheckName::Exists,
                        CheckStatus::Fail,
                        format!("group not found: {entry}"),
                    ));
                    continue;
                }
            };
            configured_group_ids.insert(group_id);
            results.push(group_check(
                &target,
                CheckName::Exists,
                CheckStatus::Pass,
                format!("group ID: {group_id}"),
            ));

            let tokens_target = Target::group(group_id);
            match self
                .client
                .paginate::<AccessToken>(&tokens_target.access_tokens_endpoint())
                .await
            {
                Ok(tokens) => {
                    results.push(group_check(
                        &target,
                        CheckName::Permissions,
                        CheckStatus::Pass,
                        "can list access tokens".to_string(),
                    ));
                    results.push(token_state_check(&target, TargetType::Group, &tokens));
                }
                Err(_) => {
                    results.push(group_check(
                        &target,
                        CheckName::Permissions,
                        CheckStatus::Fail,
                        "cannot list access tokens (Owner role required)".to_string(),
                    ));
                }
            }

            match self
                .client
                .paginate::<Webhook>(&tokens_target.hooks_endpoint())
                .await
            {
                Ok(hooks) => {
                    results.push(webhook_state_check(
                        &target,
                        TargetType::Group,
                        &hooks,
                        &self.config.webhooks.merge_request_url,
                    ));
                }
                Err(GitLabError::NotFound(_)) => {
                    results.push(group_check(
                        &target,
                        CheckName::WebhookState,
                        CheckStatus::Fail,
                        GROUP_HOOKS_UNAVAILABLE.to_string(),
                    ));
                }
                Err(e) => {
                    results.push(group_check(
                        &target,
                        CheckName::WebhookState,
                        CheckStatus::Fail,
                        format!("failed to list webhooks: {e}"),
                    ));
                }
            }
        }

        let projects = self.config.projects.clone();
        for entry in &projects {
            let target = format!("project:{entry}");

            let project_id = match resolve::resolve_project(&self.client, entry).await {
                Ok(id) => id,
                Err(_) => {
                    results.push(project_check(
                        &target,
                        CheckName::Exists,
                        CheckStatus::Fail,
                        format!("project not found: {entry}"),
                    ));
                    continue;
                }
            };
            results.push(project_check(
                &target,
                CheckName::Exists,
                CheckStatus::Pass,
                format!("project ID: {project_id}"),
            ));

            if let Some(group_id) =
                resolve::find_covering_group(&self.client, project_id, &configured_group_ids).await
            {
                results.push(project_check(
                    &target,
                    CheckName::Coverage,
                    CheckStatus::Warn,
                    format!("covered by group webhook (group ID: {group_id})"),
                ));
            }

            let tokens_target = Target::project(project_id);
            match self
                .client
                .paginate::<AccessToken>(&tokens_target.access_tokens_endpoint())
                .await
            {
                Ok(tokens) => {
                    results.push(project_check(
                        &target,
                        CheckName::Permissions,
                        CheckStatus::Pass,
                        "can list access tokens".to_string(),
                    ));
                    results.push(token_state_check(&target, TargetType::Project, &tokens));
                }
                Err(_) => {
                    results.push(project_check(
                        &target,
                        CheckName::Permissions,
                        CheckStatus::Fail,
                        "cannot list access tokens (Maintainer role or higher required)"
                            .to_string(),
                    ));
                }
            }

            match self
                .client
                .paginate::<Webhook>(&tokens_target.hooks_endpoint())
                .await
            {
                Ok(hooks) => {
                    results.push(webhook_state_check(
                        &target,
                        TargetType::Project,
                        &hooks,
                        &self.config.webhooks.merge_request_url,
                    ));
                }
                Err(e) => {
                    results.push(project_check(
                        &target,
                        CheckName::WebhookState,
                        CheckStatus::Fail,
                        format!("failed to list webhooks: {e}"),
                    ));
                }
            }
        }

        self.report.check_results = results;
        if self.report.has_check_failures() {
            ExitStatus::ChecksFailed
        } else {
            ExitStatus::Success
        }
    }
}

fn group_check(target: &str, check_name: CheckName, status: CheckStatus, message: String) -> CheckResult {
    CheckResult {
        target: target.to_string(),
        target_type: TargetType::Group,
        check_name,
        status,
        message,
    }
}

fn project_check(
    target: &str,
    check_name: CheckName,
    status: CheckStatus,
    message: String,
) -> CheckResult {
    CheckResult {
        target: target.to_string(),
        target_type: TargetType::Project,
        check_name,
        status,
        message,
    }
}

fn token_state_check(target: &str, target_type: TargetType, tokens: &[AccessToken]) -> CheckResult {
    let (status, message) = match find_valid_token(tokens) {
        Some(existing) => {
            let expires = existing
                .expires_at
                .map(|d| d.to_string())
                .unwrap_or_else(|| "never".to_string());
            (
                CheckStatus::Pass,
                format!("token exists (ID: {}, expires: {expires})", existing.id),
            )
        }
        None => (
            CheckStatus::Warn,
            "no token found (will be created on apply)".to_string(),
        ),
    };
    CheckResult {
        target: target.to_string(),
        target_type,
        check_name: CheckName::TokenState,
        status,
        message,
    }
}

fn webhook_state_check(
    target: &str,
    target_type: TargetType,
    hooks: &[Webhook],
    desired_url: &str,
) -> CheckResult {
    let (status, message) = match hooks.iter().find(|h| h.url == desired_url) {
        Some(hook) => (
            CheckStatus::Pass,
            format!("webhook exists (ID: {})", hook.id),
        ),
        None => (
            CheckStatus::Warn,
            "no webhook found (will be created on apply)".to_string(),
        ),
    };
    CheckResult {
        target: target.to_string(),
        target_type,
        check_name: CheckName::WebhookState,
        status,
        message,
    }
}
