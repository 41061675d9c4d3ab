//! Shared test support: a scripted HTTP transport and GitLab API
//! fixtures.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use outfitter::http::{HttpError, HttpMethod, HttpRequest, HttpResponse, HttpTransport};

pub const BASE: &str = "https://gitlab.example.com";
pub const HOOK_URL: &str = "https://hooks.example.com/gitlab";

/// Scripted transport: responses are registered per method + URL and
/// served FIFO; every request is captured.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    routes: HashMap<(HttpMethod, String), VecDeque<HttpResponse>>,
    requests: Vec<HttpRequest>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, method: HttpMethod, url: impl Into<String>, response: HttpResponse) {
        let mut inner = self.inner.lock().expect("scripted transport lock");
        inner
            .routes
            .entry((method, url.into()))
            .or_default()
            .push_back(response);
    }

    pub fn script_json(
        &self,
        method: HttpMethod,
        url: impl Into<String>,
        status: u16,
        body: &serde_json::Value,
    ) {
        self.script(
            method,
            url,
            HttpResponse {
                status,
                headers: vec![("Content-Type".to_string(), "application/json".to_string())],
                body: serde_json::to_vec(body).expect("serializable fixture"),
            },
        );
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.inner
            .lock()
            .expect("scripted transport lock")
            .requests
            .clone()
    }

    pub fn write_requests(&self) -> Vec<HttpRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method != HttpMethod::Get)
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut inner = self.inner.lock().expect("scripted transport lock");
        let key = (request.method, request.url.clone());
        inner.requests.push(request);

        match inner.routes.get_mut(&key).and_then(|q| q.pop_front()) {
            Some(resp) => Ok(resp),
            None => Err(HttpError::NoScriptedResponse {
                method: key.0.as_str().to_string(),
                url: key.1,
            }),
        }
    }
}

/// First page of a paginated listing.
pub fn page1(path: &str) -> String {
    format!("{BASE}{path}?page=1&per_page=100")
}
