//! In-memory `Transport` with scripted responses, shared by the unit tests.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::fetcher::{ApiRequest, ApiResponse, Transport};
use super::GitHubError;

pub const FIXED_EPOCH: u64 = 1_700_000_000;

pub fn fixed_clock() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(FIXED_EPOCH)
}

pub fn status(code: u16) -> ApiResponse {
    ApiResponse {
        status: code,
        headers: HeaderMap::new(),
        body: String::new(),
    }
}

pub fn text(body: &str) -> ApiResponse {
    status(200).with_body(body)
}

pub fn json(value: serde_json::Value) -> ApiResponse {
    status(200).with_body(&value.to_string())
}

impl ApiResponse {
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        let name = HeaderName::from_bytes(name.as_bytes()).unwrap();
        self.headers.insert(name, HeaderValue::from_str(value).unwrap());
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = body.to_string();
        self
    }
}

struct Scripted {
    response: ApiResponse,
    delay: Duration,
}

/// Responses are queued per URI; the last queued response repeats. Unknown
/// URIs answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, VecDeque<Scripted>>>,
    requests: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, uri: &str, response: ApiResponse) {
        self.respond_after(uri, Duration::ZERO, response);
    }

    pub fn respond_after(&self, uri: &str, delay: Duration, response: ApiResponse) {
        self.routes
            .lock()
            .unwrap()
            .entry(uri.to_string())
            .or_default()
            .push_back(Scripted { response, delay });
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, uri: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|request| request.uri == uri)
            .count()
    }

    pub fn requested_uris(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.uri.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GitHubError> {
        self.requests.lock().unwrap().push(request.clone());

        let (response, delay) = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&request.uri) {
                Some(queue) if queue.len() > 1 => {
                    let next = queue.pop_front().unwrap();
                    (next.response, next.delay)
                }
                Some(queue) if !queue.is_empty() => (queue[0].response.clone(), queue[0].delay),
                _ => (status(404).with_body(r#"{"message":"Not Found"}"#), Duration::ZERO),
            }
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(response)
    }
}
