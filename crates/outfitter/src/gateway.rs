//! Authenticated GitLab REST gateway.
//!
//! Wraps an [`HttpTransport`] with authentication, JSON decoding into
//! the typed records from [`crate::types`], retry with exponential
//! backoff for transient failures, `Retry-After` handling for rate
//! limits, offset pagination, and a dry-run mode that turns every
//! write into a no-op.

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::GitLabError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport};

/// Fixed page size for list endpoints.
const PER_PAGE: usize = 100;

/// Total attempts for a single logical request (1 initial + retries).
const RETRY_ATTEMPTS: usize = 3;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Wait applied when a 429 response carries no `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

/// Outcome of a write call: either the decoded response, or the
/// dry-run sentinel showing that no request was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation<T> {
    Applied(T),
    DryRun,
}

impl<T> Mutation<T> {
    /// The decoded response, if the call actually ran.
    pub fn applied(self) -> Option<T> {
        match self {
            Mutation::Applied(value) => Some(value),
            Mutation::DryRun => None,
        }
    }

    pub fn is_dry_run(&self) -> bool {
        matches!(self, Mutation::DryRun)
    }
}

/// GitLab API client. Cheap to clone; state is the base URL, the
/// credential, and the shared transport.
#[derive(Clone)]
pub struct GitLabClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
    dry_run: bool,
}

impl GitLabClient {
    pub fn new(
        base_url: &str,
        token: &str,
        dry_run: bool,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            dry_run,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run
    }

    /// GET a single JSON resource.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GitLabError> {
        self.get_with(path, &[]).await
    }

    /// GET with query parameters (values are percent-encoded).
    pub async fn get_with<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, GitLabError> {
        let resp = self.request(HttpMethod::Get, path, query, None).await?;
        decode(&resp)
    }

    /// POST a JSON body. No-op returning [`Mutation::DryRun`] in dry-run
    /// mode.
    pub async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Mutation<T>, GitLabError> {
        if self.dry_run {
            tracing::info!(%path, "dry run: skipping POST");
            return Ok(Mutation::DryRun);
        }
        let payload = encode(body)?;
        let resp = self
            .request(HttpMethod::Post, path, &[], Some(payload))
            .await?;
        Ok(Mutation::Applied(decode(&resp)?))
    }

    /// PUT a JSON body. No-op in dry-run mode.
    pub async fn put<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Mutation<T>, GitLabError> {
        if self.dry_run {
            tracing::info!(%path, "dry run: skipping PUT");
            return Ok(Mutation::DryRun);
        }
        let payload = encode(body)?;
        let resp = self
            .request(HttpMethod::Put, path, &[], Some(payload))
            .await?;
        Ok(Mutation::Applied(decode(&resp)?))
    }

    /// DELETE a resource. No-op in dry-run mode.
    pub async fn delete(&self, path: &str) -> Result<Mutation<()>, GitLabError> {
        if self.dry_run {
            tracing::info!(%path, "dry run: skipping DELETE");
            return Ok(Mutation::DryRun);
        }
        self.request(HttpMethod::Delete, path, &[], None).await?;
        Ok(Mutation::Applied(()))
    }

    /// Fetch every page of a list endpoint.
    ///
    /// Pages are requested with a fixed `per_page`; iteration stops as
    /// soon as a page comes back shorter than requested.
    pub async fn paginate<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, GitLabError> {
        let mut results = Vec::new();
        let mut page = 1usize;
        loop {
            let page_param = page.to_string();
            let per_page_param = PER_PAGE.to_string();
            let query = [
                ("page", page_param.as_str()),
                ("per_page", per_page_param.as_str()),
            ];
            let resp = self.request(HttpMethod::Get, path, &query, None).await?;
            let items: Vec<T> = decode(&resp)?;
            let count = items.len();
            results.extend(items);
            if count < PER_PAGE {
                break;
            }
            page += 1;
        }
        Ok(results)
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> String {
        let mut url = format!("{}{}", self.base_url, path);
        if !query.is_empty() {
            let qs = query
                .iter()
                .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.push('?');
            url.push_str(&qs);
        }
        url
    }

    fn headers(&self, has_body: bool) -> Vec<(String, String)> {
        let mut headers = vec![("PRIVATE-TOKEN".to_string(), self.token.clone())];
        if has_body {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers
    }

    /// Issue one logical request with retry handling.
    ///
    /// A 429 sleeps for the server-indicated duration and retries
    /// without consuming a backoff attempt. Transport failures and 5xx
    /// responses retry with exponential backoff up to the attempt
    /// budget. Any other non-success status classifies immediately and
    /// is never retried.
    async fn request(
        &self,
        method: HttpMethod,
        path: &str,
        query: &[(&str, &str)],
        body: Option<Vec<u8>>,
    ) -> Result<HttpResponse, GitLabError> {
        let url = self.url(path, query);
        let mut backoff = ExponentialBuilder::default()
            .with_min_delay(INITIAL_BACKOFF)
            .with_max_delay(MAX_BACKOFF)
            .with_max_times(RETRY_ATTEMPTS - 1)
            .build();

        loop {
            let request = HttpRequest {
                method,
                url: url.clone(),
                headers: self.headers(body.is_some()),
                body: body.clone(),
            };

            match self.transport.send(request).await {
                Ok(resp) if resp.status == 429 => {
                    let wait = resp
                        .header("Retry-After")
                        .and_then(|v| v.trim().parse::<u64>().ok())
                        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                    tracing::warn!(seconds = wait, %url, "rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                Ok(resp) if resp.status >= 500 => match backoff.next() {
                    Some(delay) => {
                        tracing::warn!(
                            status = resp.status,
                            delay_ms = delay.as_millis() as u64,
                            %url,
                            "server error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        return Err(GitLabError::Transient(format!(
                            "HTTP {} from {}",
                            resp.status, url
                        )));
                    }
                },
                Ok(resp) if !resp.is_success() => {
                    return Err(GitLabError::from_response(resp.status, &resp.text()));
                }
                Ok(resp) => return Ok(resp),
                Err(e) => match backoff.next() {
                    Some(delay) => {
                        tracing::warn!(
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            %url,
                            "request failed, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => return Err(GitLabError::Transient(e.to_string())),
                },
            }
        }
    }
}

fn decode<T: DeserializeOwned>(resp: &HttpResponse) -> Result<T, GitLabError> {
    serde_json::from_slice(&resp.body).map_err(|e| GitLabError::Deserialize(e.to_string()))
}

fn encode<B: Serialize>(body: &B) -> Result<Vec<u8>, GitLabError> {
    serde_json::to_vec(body)
        .map_err(|e| GitLabError::Deserialize(format!("request encoding failed: {e}")))
}
