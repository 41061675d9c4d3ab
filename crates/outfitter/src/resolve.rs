//! Identifier resolution and group-coverage lookup.
//!
//! Operators name groups and projects by path or by numeric ID; the
//! reconcilers only work with IDs. Purely numeric identifiers are
//! trusted as-is and never trigger a lookup call.

use std::collections::HashSet;

use crate::error::GitLabError;
use crate::gateway::GitLabClient;
use crate::types::{Group, Project};

fn is_numeric(identifier: &str) -> bool {
    !identifier.is_empty() && identifier.bytes().all(|b| b.is_ascii_digit())
}

/// Resolve a group path or numeric ID to a group ID.
///
/// Non-numeric identifiers go through the group search endpoint; the
/// first result whose full path or short path equals the identifier
/// exactly wins. Search failures and non-matches both come back as
/// [`GitLabError::NotFound`].
pub async fn resolve_group(client: &GitLabClient, identifier: &str) -> Result<u64, GitLabError> {
    if is_numeric(identifier) {
        return identifier
            .parse::<u64>()
            .map_err(|_| GitLabError::NotFound(format!("group {identifier}")));
    }

    let groups: Vec<Group> = client
        .get_with("/api/v4/groups", &[("search", identifier)])
        .await
        .map_err(|e| GitLabError::NotFound(format!("group {identifier}: {e}")))?;

    groups
        .into_iter()
        .find(|g| g.full_path == identifier || g.path == identifier)
        .map(|g| g.id)
        .ok_or_else(|| GitLabError::NotFound(format!("group {identifier}")))
}

/// Resolve a project path or numeric ID to a project ID.
///
/// Paths are fetched directly via their URL-encoded form; any failure
/// comes back as [`GitLabError::NotFound`].
pub async fn resolve_project(client: &GitLabClient, identifier: &str) -> Result<u64, GitLabError> {
    if is_numeric(identifier) {
        return identifier
            .parse::<u64>()
            .map_err(|_| GitLabError::NotFound(format!("project {identifier}")));
    }

    let encoded = urlencoding::encode(identifier);
    let project: Project = client
        .get(&format!("/api/v4/projects/{encoded}"))
        .await
        .map_err(|e| GitLabError::NotFound(format!("project {identifier}: {e}")))?;
    Ok(project.id)
}

/// Find the configured root group (if any) whose webhook already covers
/// a project.
///
/// The project's direct namespace is checked first; otherwise its
/// namespace path is walked from the most specific ancestor up to the
/// root, and the first ancestor group found in `configured` wins.
/// Every lookup failure degrades to "no coverage"; a coverage probe
/// must never block provisioning the project itself.
pub async fn find_covering_group(
    client: &GitLabClient,
    project_id: u64,
    configured: &HashSet<u64>,
) -> Option<u64> {
    let project: Project = match client.get(&format!("/api/v4/projects/{project_id}")).await {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(project_id, error = %e, "coverage lookup failed");
            return None;
        }
    };

    if configured.contains(&project.namespace.id) {
        return Some(project.namespace.id);
    }

    let parts: Vec<&str> = project.namespace.full_path.split('/').collect();
    for end in (1..parts.len()).rev() {
        let ancestor = parts[..end].join("/");
        let encoded = urlencoding::encode(&ancestor);
        match client.get::<Group>(&format!("/api/v4/groups/{encoded}")).await {
            Ok(group) if configured.contains(&group.id) => return Some(group.id),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(ancestor = %ancestor, error = %e, "ancestor lookup failed");
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::http::mock::MockTransport;
    use serde_json::json;
    use std::sync::Arc;

    const BASE: &str = "https://gitlab.example.com";

    fn client(mock: &MockTransport) -> GitLabClient {
        GitLabClient::new(BASE, "glpat-test", false, Arc::new(mock.clone()))
    }

    #[tokio::test]
    async fn numeric_group_identifier_bypasses_search() {
        let mock = MockTransport::new();
        let id = resolve_group(&client(&mock), "42").await.unwrap();
        assert_eq!(id, 42);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn group_search_matches_full_path() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups?search=eng%2Fbackend"),
            &json!([
                {"id": 1, "name": "Backend Mirror", "path": "backend-mirror", "full_path": "ops/backend-mirror"},
                {"id": 42, "name": "Backend", "path": "backend", "full_path": "eng/backend"}
            ]),
        );

        let id = resolve_group(&client(&mock), "eng/backend").await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn group_search_matches_short_path() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups?search=engineering"),
            &json!([
                {"id": 42, "name": "Engineering", "path": "engineering", "full_path": "acme/engineering"}
            ]),
        );

        let id = resolve_group(&client(&mock), "engineering").await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn group_search_without_exact_match_is_not_found() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups?search=eng"),
            &json!([
                {"id": 1, "name": "Engineering", "path": "engineering", "full_path": "engineering"}
            ]),
        );

        let err = resolve_group(&client(&mock), "eng").await.unwrap_err();
        assert!(matches!(err, GitLabError::NotFound(_)));
    }

    #[tokio::test]
    async fn group_search_failure_maps_to_not_found() {
        let mock = MockTransport::new();
        mock.push_status(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups?search=engineering"),
            403,
        );

        let err = resolve_group(&client(&mock), "engineering").await.unwrap_err();
        assert!(matches!(err, GitLabError::NotFound(_)));
    }

    #[tokio::test]
    async fn numeric_project_identifier_bypasses_lookup() {
        let mock = MockTransport::new();
        let id = resolve_project(&client(&mock), "7").await.unwrap();
        assert_eq!(id, 7);
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn project_path_is_url_encoded_for_lookup() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/eng%2Fbackend%2Fauth"),
            &json!({
                "id": 7,
                "path_with_namespace": "eng/backend/auth",
                "namespace": {"id": 42, "full_path": "eng/backend", "kind": "group"}
            }),
        );

        let id = resolve_project(&client(&mock), "eng/backend/auth")
            .await
            .unwrap();
        assert_eq!(id, 7);
    }

    #[tokio::test]
    async fn missing_project_maps_to_not_found() {
        let mock = MockTransport::new();
        mock.push_status(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/no%2Fsuch"),
            404,
        );

        let err = resolve_project(&client(&mock), "no/such").await.unwrap_err();
        assert!(matches!(err, GitLabError::NotFound(_)));
    }

    fn project_fixture(namespace_id: u64, namespace_path: &str) -> serde_json::Value {
        json!({
            "id": 7,
            "path_with_namespace": format!("{namespace_path}/auth"),
            "namespace": {"id": namespace_id, "full_path": namespace_path, "kind": "group"}
        })
    }

    #[tokio::test]
    async fn coverage_hits_direct_namespace() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/7"),
            &project_fixture(42, "eng"),
        );

        let configured = HashSet::from([42]);
        let covering = find_covering_group(&client(&mock), 7, &configured).await;
        assert_eq!(covering, Some(42));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn coverage_walks_ancestors_most_specific_first() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/7"),
            &project_fixture(99, "eng/backend/services"),
        );
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups/eng%2Fbackend"),
            &json!({"id": 55, "name": "Backend", "path": "backend", "full_path": "eng/backend"}),
        );

        let configured = HashSet::from([55]);
        let covering = find_covering_group(&client(&mock), 7, &configured).await;
        assert_eq!(covering, Some(55));

        // The most specific ancestor matched; the root was never fetched.
        let urls: Vec<String> = mock.requests().into_iter().map(|r| r.url).collect();
        assert!(!urls.iter().any(|u| u.ends_with("/groups/eng")));
    }

    #[tokio::test]
    async fn coverage_returns_none_when_no_ancestor_is_configured() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/7"),
            &project_fixture(99, "eng/backend"),
        );
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups/eng"),
            &json!({"id": 3, "name": "Engineering", "path": "eng", "full_path": "eng"}),
        );

        let configured = HashSet::from([42]);
        assert_eq!(find_covering_group(&client(&mock), 7, &configured).await, None);
    }

    #[tokio::test]
    async fn coverage_degrades_to_none_on_project_lookup_failure() {
        let mock = MockTransport::new();
        mock.push_status(HttpMethod::Get, format!("{BASE}/api/v4/projects/7"), 403);

        let configured = HashSet::from([42]);
        assert_eq!(find_covering_group(&client(&mock), 7, &configured).await, None);
    }

    #[tokio::test]
    async fn coverage_skips_unresolvable_ancestors() {
        let mock = MockTransport::new();
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/projects/7"),
            &project_fixture(99, "eng/backend/services"),
        );
        mock.push_status(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups/eng%2Fbackend"),
            404,
        );
        mock.push_json(
            HttpMethod::Get,
            format!("{BASE}/api/v4/groups/eng"),
            &json!({"id": 42, "name": "Engineering", "path": "eng", "full_path": "eng"}),
        );

        let configured = HashSet::from([42]);
        assert_eq!(
            find_covering_group(&client(&mock), 7, &configured).await,
            Some(42)
        );
    }
}
