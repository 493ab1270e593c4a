use async_trait::async_trait;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument, warn};

use super::pool::Interrupt;
use super::GitHubError;

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = "github-fame";

/// Lower bound for a rate-limit sleep, so a reset time in the past never spins.
const MIN_BACKOFF_SECS: f64 = 0.3;
/// Added on top of the advertised reset time to absorb clock skew.
const RESET_GRACE_SECS: f64 = 0.1;

/// A fully-prepared GET request against the GitHub API.
#[derive(Clone)]
pub struct ApiRequest {
    pub uri: String,
    pub headers: Vec<(&'static str, String)>,
}

impl ApiRequest {
    #[cfg(test)]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Status, headers and decoded body of a completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl ApiResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Reset epoch of an exhausted quota. Only a 403 carrying
    /// `x-ratelimit-reset` counts; other 403s are permission failures.
    fn rate_limit_reset(&self) -> Option<f64> {
        if self.status != 403 {
            return None;
        }
        self.header("x-ratelimit-reset")?.trim().parse::<f64>().ok()
    }

    /// The `message` field GitHub puts in JSON error bodies, or the raw body.
    fn error_message(&self) -> String {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            message: String,
        }

        match serde_json::from_str::<ErrorBody>(&self.body) {
            Ok(parsed) => parsed.message,
            Err(_) => self.body.chars().take(200).collect(),
        }
    }
}

/// The single network seam of the crate. Implementations perform exactly one
/// request and never retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GitHubError>;
}

/// `Transport` backed by a pooled reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, GitHubError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, GitHubError> {
        let mut builder = self.client.get(&request.uri);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        // text() decodes with the charset declared in Content-Type.
        let body = response.text().await?;

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// Issues GitHub API requests and waits out rate-limit rejections.
///
/// Quota exhaustion is retried indefinitely: the API always names the moment
/// the quota refills, so every wait is bounded. Any other failure is returned
/// to the caller untouched. Requests and rate-limit sleeps both give way to
/// the interrupt.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    transport: Arc<dyn Transport>,
    token: Option<String>,
    interrupt: Interrupt,
    clock: fn() -> SystemTime,
}

impl RateLimitedFetcher {
    pub fn new(transport: Arc<dyn Transport>, token: Option<String>) -> Self {
        Self {
            transport,
            token: token.filter(|t| !t.is_empty()),
            interrupt: Interrupt::never(),
            clock: SystemTime::now,
        }
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: fn() -> SystemTime) -> Self {
        self.clock = clock;
        self
    }

    fn request(&self, uri: &str, accept: &str) -> ApiRequest {
        let mut headers = vec![
            ("Accept", accept.to_string()),
            ("X-GitHub-Api-Version", API_VERSION.to_string()),
        ];
        if let Some(token) = &self.token {
            headers.push(("Authorization", format!("Bearer {}", token)));
        }
        ApiRequest {
            uri: uri.to_string(),
            headers,
        }
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn fetch(&self, uri: &str, accept: &str) -> Result<ApiResponse, GitHubError> {
        let request = self.request(uri, accept);

        loop {
            let response = self.interrupt.guard(self.transport.send(&request)).await??;
            if response.is_success() {
                debug!(status = response.status, bytes = response.body.len(), "response received");
                return Ok(response);
            }

            if let Some(reset_epoch) = response.rate_limit_reset() {
                let delay = backoff_delay(reset_epoch, (self.clock)());
                warn!(
                    remaining = response.header("x-ratelimit-remaining").unwrap_or("unknown"),
                    "Hit rate limit of {} requests. Sleeping for {:.2} seconds. Use authorization to prevent this.",
                    response.header("x-ratelimit-limit").unwrap_or("unknown"),
                    delay.as_secs_f64()
                );
                self.interrupt.guard(tokio::time::sleep(delay)).await?;
                continue;
            }

            return Err(GitHubError::Status {
                status: response.status,
                uri: uri.to_string(),
                message: response.error_message(),
            });
        }
    }
}

/// Time to sleep before retrying, given the quota reset epoch in seconds.
pub fn backoff_delay(reset_epoch: f64, now: SystemTime) -> Duration {
    let now = now
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    Duration::from_secs_f64((reset_epoch - now + RESET_GRACE_SECS).max(MIN_BACKOFF_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::testing::{fixed_clock, status, text, ScriptedTransport, FIXED_EPOCH};
    use crate::github::{DIFF_MEDIA_TYPE, JSON_MEDIA_TYPE};

    const URI: &str = "https://api.test/repos/org/repo/pulls/1";

    fn fetcher(transport: &Arc<ScriptedTransport>, token: Option<&str>) -> RateLimitedFetcher {
        RateLimitedFetcher::new(transport.clone(), token.map(str::to_string)).with_clock(fixed_clock)
    }

    #[test]
    fn test_backoff_delay_waits_until_reset() {
        let now = UNIX_EPOCH + Duration::from_secs(FIXED_EPOCH);
        let delay = backoff_delay((FIXED_EPOCH + 2) as f64, now);
        assert!((delay.as_secs_f64() - 2.1).abs() < 1e-6);
    }

    #[test]
    fn test_backoff_delay_has_floor() {
        let now = UNIX_EPOCH + Duration::from_secs(FIXED_EPOCH);
        let delay = backoff_delay((FIXED_EPOCH - 60) as f64, now);
        assert!((delay.as_secs_f64() - 0.3).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_request_headers_with_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URI, text("diff"));

        fetcher(&transport, Some("s3cret")).fetch(URI, DIFF_MEDIA_TYPE).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header("accept"), Some(DIFF_MEDIA_TYPE));
        assert_eq!(requests[0].header("x-github-api-version"), Some(API_VERSION));
        assert_eq!(requests[0].header("authorization"), Some("Bearer s3cret"));
    }

    #[tokio::test]
    async fn test_request_headers_without_token() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URI, text("{}"));

        fetcher(&transport, None).fetch(URI, JSON_MEDIA_TYPE).await.unwrap();
        fetcher(&transport, Some("")).fetch(URI, JSON_MEDIA_TYPE).await.unwrap();

        for request in transport.requests() {
            assert!(request.header("authorization").is_none());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_sleeps_then_retries() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            URI,
            status(403)
                .with_header("x-ratelimit-limit", "60")
                .with_header("x-ratelimit-remaining", "0")
                .with_header("x-ratelimit-reset", &(FIXED_EPOCH + 2).to_string()),
        );
        transport.respond(URI, text("after the wait"));

        let started = tokio::time::Instant::now();
        let response = fetcher(&transport, None).fetch(URI, JSON_MEDIA_TYPE).await.unwrap();
        let waited = started.elapsed().as_secs_f64();

        assert_eq!(response.body, "after the wait");
        assert_eq!(transport.request_count(URI), 2);
        assert!((2.09..2.2).contains(&waited), "waited {waited}s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_retries_repeatedly() {
        let transport = Arc::new(ScriptedTransport::new());
        let limited = status(403).with_header("x-ratelimit-reset", &FIXED_EPOCH.to_string());
        for _ in 0..5 {
            transport.respond(URI, limited.clone());
        }
        transport.respond(URI, text("ok"));

        let response = fetcher(&transport, None).fetch(URI, JSON_MEDIA_TYPE).await.unwrap();
        assert_eq!(response.body, "ok");
        assert_eq!(transport.request_count(URI), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_cuts_rate_limit_sleep_short() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(
            URI,
            status(403).with_header("x-ratelimit-reset", &(FIXED_EPOCH + 3600).to_string()),
        );
        transport.respond(URI, text("too late"));

        let (sender, interrupt) = Interrupt::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sender.send(true).unwrap();
        });

        let started = tokio::time::Instant::now();
        let err = fetcher(&transport, None)
            .with_interrupt(interrupt)
            .fetch(URI, JSON_MEDIA_TYPE)
            .await
            .unwrap_err();

        assert!(matches!(err, GitHubError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(transport.request_count(URI), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interrupt_abandons_slow_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_after(URI, Duration::from_secs(3600), text("too late"));

        let (sender, interrupt) = Interrupt::new();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            sender.send(true).unwrap();
        });

        let started = tokio::time::Instant::now();
        let err = fetcher(&transport, None)
            .with_interrupt(interrupt)
            .fetch(URI, JSON_MEDIA_TYPE)
            .await
            .unwrap_err();

        assert!(matches!(err, GitHubError::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_forbidden_without_reset_is_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URI, status(403).with_body(r#"{"message":"Resource not accessible"}"#));

        let err = fetcher(&transport, None).fetch(URI, JSON_MEDIA_TYPE).await.unwrap_err();
        match err {
            GitHubError::Status { status, message, .. } => {
                assert_eq!(status, 403);
                assert_eq!(message, "Resource not accessible");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.request_count(URI), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(URI, status(404).with_body("gone"));

        let err = fetcher(&transport, None).fetch(URI, JSON_MEDIA_TYPE).await.unwrap_err();
        assert!(matches!(err, GitHubError::Status { status: 404, .. }));
        assert!(err.to_string().contains("gone"));
    }
}
