//! Access-token reconciliation.
//!
//! A target is satisfied by exactly one named, non-revoked token.
//! Existing valid tokens are never rotated or recreated, and
//! `expires_at` is never compared against the clock: an expired but
//! unrevoked token still satisfies the requirement.

use chrono::Utc;
use serde::Serialize;

use crate::config::{AuthMode, Config};
use crate::gateway::{GitLabClient, Mutation};
use crate::report::{ActionReport, ErrorEntry, Operation, TokenCreated, TokenVerified};
use crate::types::{AccessToken, ResourceKind, Target};

/// Name of the token (and webhook) the integration owns on each target.
pub const INTEGRATION_NAME: &str = "Outfitter Integration";

pub const TOKEN_DESCRIPTION: &str = "Provisioned by outfitter. Grants the merge-request \
integration API access and repository read access for review and indexing.";

pub const TOKEN_SCOPES: [&str; 2] = ["api", "read_repository"];

/// GitLab access level 40 (Maintainer).
pub const TOKEN_ACCESS_LEVEL: u8 = 40;

#[derive(Debug, Serialize)]
struct CreateTokenRequest<'a> {
    name: &'a str,
    description: &'a str,
    scopes: &'a [&'a str],
    access_level: u8,
    expires_at: String,
}

/// Find the token satisfying the requirement: integration name, not
/// revoked. Expiry is not considered.
pub fn find_valid_token(tokens: &[AccessToken]) -> Option<&AccessToken> {
    tokens
        .iter()
        .find(|t| t.name == INTEGRATION_NAME && !t.revoked)
}

/// Role guidance for permission failures, by target kind.
fn permission_hint(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Group => "Owner role is required to create group access tokens",
        ResourceKind::Project => {
            "Maintainer role or higher is required to create project access tokens"
        }
    }
}

/// Ensure the target carries a valid integration token.
///
/// Returns the one-time secret when a token was freshly created, `None`
/// otherwise (already present, skipped, dry-run, or failed). The secret
/// goes into the report; it is never written to the log stream.
pub async fn ensure_token(
    client: &GitLabClient,
    config: &Config,
    target: Target,
    report: &mut ActionReport,
) -> Option<String> {
    if config.auth_mode == AuthMode::BotUserPat {
        tracing::debug!(%target, "shared personal access token in use, skipping token provisioning");
        return None;
    }

    let endpoint = target.access_tokens_endpoint();
    let tokens: Vec<AccessToken> = match client.paginate(&endpoint).await {
        Ok(tokens) => tokens,
        Err(e) => {
            tracing::error!(%target, error = %e, "failed to list access tokens");
            report
                .errors
                .push(ErrorEntry::for_target(target, Operation::EnsureToken, &e));
            return None;
        }
    };

    if let Some(existing) = find_valid_token(&tokens) {
        tracing::info!(%target, token_id = existing.id, "access token already present");
        report.tokens_verified.push(TokenVerified {
            target,
            token_id: existing.id,
            token_name: existing.name.clone(),
        });
        return None;
    }

    let expires_at = (Utc::now() + chrono::Duration::days(config.token_expires_in_days))
        .format("%Y-%m-%d")
        .to_string();
    tracing::info!(%target, %expires_at, "creating access token");

    let payload = CreateTokenRequest {
        name: INTEGRATION_NAME,
        description: TOKEN_DESCRIPTION,
        scopes: &TOKEN_SCOPES,
        access_level: TOKEN_ACCESS_LEVEL,
        expires_at,
    };

    match client.post::<_, AccessToken>(&endpoint, &payload).await {
        Ok(Mutation::Applied(created)) => {
            tracing::info!(
                %target,
                token_id = created.id,
                "access token created; value disclosed in the report only"
            );
            let value = created.token.clone();
            report.tokens_created.push(TokenCreated {
                target,
                token_id: created.id,
                token_name: created.name,
                token_value: value.clone().unwrap_or_default(),
            });
            value
        }
        Ok(Mutation::DryRun) => None,
        Err(e) => {
            let entry = if e.manual_action_required() {
                tracing::error!(
                    %target,
                    "insufficient permissions to create the access token; {}",
                    permission_hint(target.kind)
                );
                ErrorEntry {
                    target: target.to_string(),
                    operation: Operation::EnsureToken,
                    message: format!("insufficient permissions: {}", permission_hint(target.kind)),
                    manual_action_required: true,
                }
            } else {
                tracing::error!(%target, error = %e, "failed to create access token");
                ErrorEntry::for_target(target, Operation::EnsureToken, &e)
            };
            report.errors.push(entry);
            None
        }
    }
}
