//! Webhook reconciliation.
//!
//! Hooks are keyed by URL. A matching hook is updated in place when any
//! tracked field drifts from the desired record, and left alone when
//! everything matches; the event-flag policy is fixed: merge-request
//! and comment events on, push and pipeline events off, SSL
//! verification required.

use rand::RngCore;
use serde::Serialize;

use crate::error::GitLabError;
use crate::gateway::GitLabClient;
use crate::report::{ActionReport, ErrorEntry, Operation, WebhookEntry};
use crate::token::INTEGRATION_NAME;
use crate::types::{ResourceKind, Target, Webhook};

pub const HOOK_DESCRIPTION: &str = "Provisioned by outfitter. Delivers merge-request and \
comment events to the integration endpoint.";

/// Message for the expected 404 when a group's plan tier has no group
/// webhooks.
pub const GROUP_HOOKS_UNAVAILABLE: &str =
    "group webhooks are not available on this GitLab plan tier (Premium or higher required)";

/// The hook record the reconciler converges every target onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesiredHook {
    pub url: String,
    pub enable_ssl_verification: bool,
    pub token: String,
    pub push_events: bool,
    pub merge_requests_events: bool,
    pub note_events: bool,
    pub pipeline_events: bool,
    pub name: &'static str,
    pub description: &'static str,
}

impl DesiredHook {
    /// Build the desired record from the template URL and secret,
    /// applying the fixed event policy.
    #[must_use]
    pub fn from_template(url: &str, secret: &str) -> Self {
        Self {
            url: url.to_string(),
            enable_ssl_verification: true,
            token: secret.to_string(),
            push_events: false,
            merge_requests_events: true,
            note_events: true,
            pipeline_events: false,
            name: INTEGRATION_NAME,
            description: HOOK_DESCRIPTION,
        }
    }

    /// Field-wise equality over exactly the tracked fields. `name` and
    /// `description` are sent on writes but never compared.
    #[must_use]
    pub fn matches(&self, existing: &Webhook) -> bool {
        existing.url == self.url
            && existing.enable_ssl_verification == self.enable_ssl_verification
            && existing.push_events == self.push_events
            && existing.merge_requests_events == self.merge_requests_events
            && existing.note_events == self.note_events
            && existing.pipeline_events == self.pipeline_events
            && existing.token.as_deref() == Some(self.token.as_str())
    }
}

/// Generate a webhook secret: 32 random bytes as 64 hex characters.
#[must_use]
pub fn generate_webhook_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Ensure the target carries a webhook matching the desired record.
///
/// Returns whether the target ended up in the desired state (created,
/// updated, or already matching).
pub async fn ensure_webhook(
    client: &GitLabClient,
    target: Target,
    desired: &DesiredHook,
    report: &mut ActionReport,
) -> bool {
    let endpoint = target.hooks_endpoint();
    let hooks: Vec<Webhook> = match client.paginate(&endpoint).await {
        Ok(hooks) => hooks,
        Err(GitLabError::NotFound(_)) if target.kind == ResourceKind::Group => {
            // Expected on lower plan tiers; distinct from a real failure.
            tracing::warn!(%target, "{GROUP_HOOKS_UNAVAILABLE}");
            let err = GitLabError::FeatureUnavailable(GROUP_HOOKS_UNAVAILABLE.to_string());
            report
                .errors
                .push(ErrorEntry::for_target(target, Operation::EnsureWebhook, &err));
            return false;
        }
        Err(e) => {
            tracing::error!(%target, error = %e, "failed to list webhooks");
            report
                .errors
                .push(ErrorEntry::for_target(target, Operation::EnsureWebhook, &e));
            return false;
        }
    };

    // First URL match wins if the API hands back duplicates.
    let existing = hooks.iter().find(|h| h.url == desired.url);

    match existing {
        None => {
            tracing::info!(%target, url = %desired.url, "creating webhook");
            match client.post::<_, Webhook>(&endpoint, desired).await {
                Ok(created) => {
                    report.webhooks_created.push(WebhookEntry {
                        target,
                        hook_id: created.applied().map(|h| h.id),
                        url: desired.url.clone(),
                    });
                    true
                }
                Err(e) => {
                    tracing::error!(%target, error = %e, "failed to create webhook");
                    report
                        .errors
                        .push(ErrorEntry::for_target(target, Operation::EnsureWebhook, &e));
                    false
                }
            }
        }
        Some(hook) if !desired.matches(hook) => {
            tracing::info!(%target, hook_id = hook.id, "updating webhook");
            match client
                .put::<_, Webhook>(&format!("{endpoint}/{}", hook.id), desired)
                .await
            {
                Ok(_) => {
                    report.webhooks_updated.push(WebhookEntry {
                        target,
                        hook_id: Some(hook.id),
                        url: desired.url.clone(),
                    });
                    true
                }
                Err(e) => {
                    tracing::error!(%target, error = %e, "failed to update webhook");
                    report
                        .errors
                        .push(ErrorEntry::for_target(target, Operation::EnsureWebhook, &e));
                    false
                }
            }
        }
        Some(hook) => {
            tracing::debug!(%target, hook_id = hook.id, "webhook already configured");
            report.webhooks_unchanged.push(WebhookEntry {
                target,
                hook_id: Some(hook.id),
                url: desired.url.clone(),
            });
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::http::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const BASE: &str = "https://gitlab.example.com";
    const HOOK_URL: &str = "https://hooks.example.com/gitlab";

    fn client(mock: &MockTransport, dry_run: bool) -> GitLabClient {
        GitLabClient::new(BASE, "glpat-test", dry_run, Arc::new(mock.clone()))
    }

    fn hooks_url(kind: &str, id: u64) -> String {
        format!("{BASE}/api/v4/{kind}/{id}/hooks?page=1&per_page=100")
    }

    fn desired() -> DesiredHook {
        DesiredHook::from_template(HOOK_URL, "secret-value")
    }

    fn matching_hook() -> serde_json::Value {
        json!({
            "id": 11,
            "url": HOOK_URL,
            "push_events": false,
            "merge_requests_events": true,
            "note_events": true,
            "pipeline_events": false,
            "enable_ssl_verification": true,
            "token": "secret-value"
        })
    }

    #[test]
    fn desired_hook_applies_fixed_event_policy() {
        let hook = desired();
        assert!(hook.merge_requests_events);
        assert!(hook.note_events);
        assert!(!hook.push_events);
        assert!(!hook.pipeline_events);
        assert!(hook.enable_ssl_verification);
        assert_eq!(hook.name, INTEGRATION_NAME);
    }

    #[test]
    fn matches_compares_exactly_the_tracked_fields() {
        let reference = desired();
        let hook: Webhook = serde_json::from_value(matching_hook()).unwrap();
        assert!(reference.matches(&hook));

        let mutations: [fn(&mut Webhook); 8] = [
            |h| h.url = "https://elsewhere.example.com".to_string(),
            |h| h.push_events = true,
            |h| h.merge_requests_events = false,
            |h| h.note_events = false,
            |h| h.pipeline_events = true,
            |h| h.enable_ssl_verification = false,
            |h| h.token = Some("other".to_string()),
            |h| h.token = None,
        ];
        for mutate in mutations {
            let mut drifted: Webhook = serde_json::from_value(matching_hook()).unwrap();
            mutate(&mut drifted);
            assert!(!reference.matches(&drifted));
        }
    }

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let secret = generate_webhook_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(secret, generate_webhook_secret());
    }

    #[tokio::test]
    async fn missing_hook_is_created_with_full_desired_record() {
        let mock = MockTransport::new();
        mock.push_json(HttpMethod::Get, hooks_url("groups", 42), &json!([]));
        mock.push_json(
            HttpMethod::Post,
            format!("{BASE}/api/v4/groups/42/hooks"),
            &json!({"id": 11, "url": HOOK_URL}),
        );
        let mut report = ActionReport::default();

        let ok = ensure_webhook(&client(&mock, false), Target::group(42), &desired(), &mut report)
            .await;

        assert!(ok);
        assert_eq!(report.webhooks_created.len(), 1);
        assert_eq!(report.webhooks_created[0].hook_id, Some(11));

        let requests = mock.requests();
        let post = requests
            .iter()
            .find(|r| r.method == HttpMethod::Post)
            .expect("creation request");
        let body: serde_json::Value = serde_json::from_slice(post.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["url"], HOOK_URL);
        assert_eq!(body["enable_ssl_verification"], true);
        assert_eq!(body["merge_requests_events"], true);
        assert_eq!(body["note_events"], true);
        assert_eq!(body["push_events"], false);
        assert_eq!(body["pipeline_events"], false);
        assert_eq!(body["token"], "secret-value");
    }

    #[tokio::test]
    async fn drifted_hook_is_updated_in_place() {
        let mock = MockTransport::new();
        let mut drifted = matching_hook();
        drifted["note_events"] = json!(false);
        mock.push_json(HttpMethod::Get, hooks_url("projects", 7), &json!([drifted]));
        mock.push_json(
            HttpMethod::Put,
            format!("{BASE}/api/v4/projects/7/hooks/11"),
            &matching_hook(),
        );
        let mut report = ActionReport::default();

        let ok = ensure_webhook(
            &client(&mock, false),
            Target::project(7),
            &desired(),
            &mut report,
        )
        .await;

        assert!(ok);
        assert_eq!(report.webhooks_updated.len(), 1);
        assert_eq!(report.webhooks_updated[0].hook_id, Some(11));
        assert!(report.webhooks_created.is_empty());

        // The update carries the complete desired record.
        let requests = mock.requests();
        let put = requests
            .iter()
            .find(|r| r.method == HttpMethod::Put)
            .expect("update request");
        let body: serde_json::Value = serde_json::from_slice(put.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["note_events"], true);
        assert_eq!(body["token"], "secret-value");
    }

    #[tokio::test]
    async fn matching_hook_issues_no_write_call() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            hooks_url("groups", 42),
            &json!([matching_hook()]),
        );
        let mut report = ActionReport::default();

        let ok = ensure_webhook(&client(&mock, false), Target::group(42), &desired(), &mut report)
            .await;

        assert!(ok);
        assert_eq!(report.webhooks_unchanged.len(), 1);
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn first_url_match_wins_when_duplicates_exist() {
        let mock = MockTransport::new();
        let mut second = matching_hook();
        second["id"] = json!(12);
        mock.push_json(
            HttpMethod::Get,
            hooks_url("groups", 42),
            &json!([matching_hook(), second]),
        );
        let mut report = ActionReport::default();

        ensure_webhook(&client(&mock, false), Target::group(42), &desired(), &mut report).await;
        assert_eq!(report.webhooks_unchanged[0].hook_id, Some(11));
    }

    #[tokio::test]
    async fn group_hooks_404_is_reported_as_feature_unavailable() {
        let mock = MockTransport::new();
        mock.push_status(HttpMethod::Get, hooks_url("groups", 42), 404);
        let mut report = ActionReport::default();

        let ok = ensure_webhook(&client(&mock, false), Target::group(42), &desired(), &mut report)
            .await;

        assert!(!ok);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].message, GROUP_HOOKS_UNAVAILABLE);
        assert!(!report.errors[0].manual_action_required);
    }

    #[tokio::test]
    async fn project_hooks_404_stays_a_generic_error() {
        let mock = MockTransport::new();
        mock.push_status(HttpMethod::Get, hooks_url("projects", 7), 404);
        let mut report = ActionReport::default();

        let ok = ensure_webhook(
            &client(&mock, false),
            Target::project(7),
            &desired(),
            &mut report,
        )
        .await;

        assert!(!ok);
        assert_eq!(report.errors.len(), 1);
        assert_ne!(report.errors[0].message, GROUP_HOOKS_UNAVAILABLE);
    }

    #[tokio::test]
    async fn dry_run_creation_is_recorded_without_hook_id() {
        let mock = MockTransport::new();
        mock.push_json(HttpMethod::Get, hooks_url("groups", 42), &json!([]));
        let mut report = ActionReport::default();

        let ok = ensure_webhook(&client(&mock, true), Target::group(42), &desired(), &mut report)
            .await;

        assert!(ok);
        assert_eq!(report.webhooks_created.len(), 1);
        assert_eq!(report.webhooks_created[0].hook_id, None);
        // Listing only; the POST was suppressed.
        assert_eq!(mock.requests().len(), 1);
    }
}
