//! The fetch client: per-host paced HTTP issuance with adaptive rate and
//! bounded retry.
//!
//! Each host gets its own leaky-bucket permit: a 429 halves that host's
//! rate and the rate never climbs back on its own, only a process restart
//! resets it. A fixed set of transient status codes gets retried with a
//! backoff scaled by the *current* per-host rate. The per-host map uses
//! `DashMap` instead of a bare mutex-guarded `HashMap` so one host's lock
//! contention never blocks lookups for another host.

use crate::cancellation::cancellable;
use crate::error::{CrawlError, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Status codes that trigger a retry.
const RETRY_STATUS: &[u16] = &[408, 425, 429, 500, 502, 503, 504];

/// A streamed HTTP response. The caller is responsible for draining the
/// body (via [`Response::bytes`] or [`Response::text`]), which also closes
/// it.
pub struct Response {
    status: u16,
    headers: HeaderMap,
    url: url::Url,
    inner: reqwest::Response,
}

impl Response {
    /// Wrap a raw `reqwest` response. Exposed crate-wide so test doubles
    /// (e.g. the robots policy's stub fetcher) can produce a `Response`
    /// from a real `mockito`-backed request without going through
    /// `HttpFetcher`.
    pub(crate) fn from_reqwest(inner: reqwest::Response) -> Self {
        Self {
            status: inner.status().as_u16(),
            headers: inner.headers().clone(),
            url: inner.url().clone(),
            inner,
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The URL the response actually came from, after any redirects.
    /// Relative anchors found in the body should be resolved against this,
    /// not the request URL, so that a redirected page's relative links
    /// still come out correct.
    pub fn url(&self) -> &url::Url {
        &self.url
    }

    /// True for a successful, body-bearing status: `[200, 299]` minus `204`.
    pub fn is_success_body(&self) -> bool {
        (200..300).contains(&self.status) && self.status != 204
    }

    /// Case-insensitive substring match against every occurrence of a
    /// header, not just the first. Servers commonly repeat `X-Robots-Tag`
    /// once per targeted agent plus a general line, so a single-value
    /// lookup would miss a `noindex`/`nofollow` directive that isn't in
    /// the first occurrence.
    pub fn header_contains(&self, name: &str, needle: &str) -> bool {
        let needle = needle.to_ascii_lowercase();
        self.headers.get_all(name).iter().any(|v| {
            v.to_str()
                .map(|v| v.to_ascii_lowercase().contains(&needle))
                .unwrap_or(false)
        })
    }

    /// The `content-type` header parsed as a [`mime::Mime`], if present and
    /// well-formed. Used where the robots policy needs an exact
    /// `text/plain` match rather than the looser substring check
    /// `header_contains` does for the worker's crawlability predicate.
    pub fn content_type_mime(&self) -> Option<mime::Mime> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<mime::Mime>().ok())
    }

    /// Drain and return the body as bytes, closing the response.
    pub async fn bytes(self) -> Result<bytes::Bytes> {
        self.inner.bytes().await.map_err(CrawlError::Network)
    }

    /// Drain and return the body as text, closing the response.
    pub async fn text(self) -> Result<String> {
        self.inner.text().await.map_err(CrawlError::Network)
    }
}

/// The abstraction the rest of the core calls: issue `HEAD`/`GET` requests.
/// Any concrete HTTP implementation satisfying this is acceptable.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn head(&self, url: &str) -> Result<Response>;
    async fn get(&self, url: &str) -> Result<Response>;
}

/// Per-host leaky-bucket state: a burst of one permit, refilling at `rate`
/// permits per second.
struct HostState {
    rate: f64,
    available_at: Instant,
}

/// Per-host rate limiting state. Owned exclusively by the fetch client —
/// nothing else reads or writes a host's rate.
struct RateLimiter {
    hosts: DashMap<String, Arc<Mutex<HostState>>>,
    initial_rate: f64,
}

impl RateLimiter {
    fn new(initial_rate: f64) -> Self {
        Self {
            hosts: DashMap::new(),
            initial_rate,
        }
    }

    fn entry(&self, host: &str) -> Arc<Mutex<HostState>> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(HostState {
                    rate: self.initial_rate,
                    available_at: Instant::now(),
                }))
            })
            .clone()
    }

    /// The rate currently in effect for `host`, used to compute the next
    /// retry's backoff duration.
    async fn current_rate(&self, host: &str) -> f64 {
        let state = self.entry(host);
        let guard = state.lock().await;
        guard.rate
    }

    /// Block until a permit is available for `host`, honoring
    /// cancellation. Exactly one permit is consumed per call, including
    /// retries — each retry re-acquires before re-issuing.
    async fn acquire(&self, host: &str, token: &CancellationToken) -> Result<()> {
        let state = self.entry(host);
        let wait = {
            let mut guard = state.lock().await;
            let now = Instant::now();
            let wait = guard.available_at.saturating_duration_since(now);
            let interval = Duration::from_secs_f64(1.0 / guard.rate.max(f64::MIN_POSITIVE));
            guard.available_at = now.max(guard.available_at) + interval;
            wait
        };
        if wait.is_zero() {
            return Ok(());
        }
        cancellable(token, tokio::time::sleep(wait)).await
    }

    /// Halve the permit rate for `host`. Applies to subsequent
    /// acquisitions only — an in-flight wait already computed its delay.
    async fn halve(&self, host: &str) {
        let state = self.entry(host);
        let mut guard = state.lock().await;
        guard.rate /= 2.0;
    }
}

/// `reqwest`-backed [`Fetcher`] implementing per-host pacing, adaptive
/// backoff, and bounded retry.
pub struct HttpFetcher {
    client: reqwest::Client,
    rate_limiter: RateLimiter,
    max_retry: usize,
    cancellation: CancellationToken,
}

impl HttpFetcher {
    pub fn new(config: &crate::config::Config, cancellation: CancellationToken) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.http_timeout)
            .build()?;
        Ok(Self {
            client,
            rate_limiter: RateLimiter::new(config.http_rate_limit),
            max_retry: config.http_max_retry,
            cancellation,
        })
    }

    fn host_of(url: &str) -> Result<String> {
        reqwest::Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .ok_or_else(|| CrawlError::Normalization(format!("cannot extract host from {url}")))
    }

    async fn issue(&self, method: reqwest::Method, url: &str) -> Result<Response> {
        let host = Self::host_of(url)?;

        self.rate_limiter.acquire(&host, &self.cancellation).await?;

        let mut response = self.do_request(method.clone(), url).await?;

        if response.status == 429 {
            self.rate_limiter.halve(&host).await;
        }

        let mut retry = 0;
        while RETRY_STATUS.contains(&response.status) && retry < self.max_retry {
            let rate = self.rate_limiter.current_rate(&host).await;
            let backoff = Duration::from_secs_f64((1.0 / rate.max(f64::MIN_POSITIVE)) * 10f64.powi(retry as i32));
            cancellable(&self.cancellation, tokio::time::sleep(backoff)).await?;

            self.rate_limiter.acquire(&host, &self.cancellation).await?;

            response = self.do_request(method.clone(), url).await?;
            if response.status == 429 {
                self.rate_limiter.halve(&host).await;
            }
            retry += 1;
        }

        Ok(response)
    }

    async fn do_request(&self, method: reqwest::Method, url: &str) -> Result<Response> {
        let resp = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(CrawlError::Network)?;
        Ok(Response::from_reqwest(resp))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    #[tracing::instrument(skip(self))]
    async fn head(&self, url: &str) -> Result<Response> {
        self.issue(reqwest::Method::HEAD, url).await
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, url: &str) -> Result<Response> {
        self.issue(reqwest::Method::GET, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn fetcher(rate: f64, max_retry: usize) -> HttpFetcher {
        let config = Config {
            http_rate_limit: rate,
            http_max_retry: max_retry,
            http_timeout: Duration::from_secs(5),
            ..Config::default()
        };
        HttpFetcher::new(&config, CancellationToken::new()).unwrap()
    }

    #[tokio::test]
    async fn retries_408_exactly_max_retry_plus_one_times() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(408)
            .expect(3) // N+1 with max_retry = 2
            .create_async()
            .await;

        let fetcher = fetcher(1000.0, 2);
        let url = format!("{}/", server.url());
        let resp = fetcher.get(&url).await.unwrap();
        assert_eq!(resp.status(), 408);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn halves_rate_exactly_once_on_429() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(429)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher(2.0, 0);
        let url = format!("{}/", server.url());
        let host = HttpFetcher::host_of(&url).unwrap();

        fetcher.get(&url).await.unwrap();
        assert_eq!(fetcher.rate_limiter.current_rate(&host).await, 1.0);
    }

    #[tokio::test]
    async fn non_retryable_status_is_returned_immediately() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;

        let fetcher = fetcher(1000.0, 3);
        let url = format!("{}/", server.url());
        let resp = fetcher.get(&url).await.unwrap();
        assert_eq!(resp.status(), 404);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn same_host_requests_are_paced_by_rate() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/")
            .with_status(200)
            .expect(3)
            .create_async()
            .await;

        // One request per 100ms.
        let fetcher = fetcher(10.0, 0);
        let url = format!("{}/", server.url());

        let start = Instant::now();
        for _ in 0..3 {
            fetcher.get(&url).await.unwrap();
        }
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(180), "elapsed={elapsed:?}");
    }

    #[tokio::test]
    async fn cancellation_aborts_a_pending_acquire() {
        let token = CancellationToken::new();
        let config = Config {
            http_rate_limit: 0.5, // one permit every 2 seconds
            ..Config::default()
        };
        let fetcher = HttpFetcher::new(&config, token.clone()).unwrap();
        let rl = &fetcher.rate_limiter;
        // Consume the initial burst permit so the next acquire must wait.
        rl.acquire("example.com", &token).await.unwrap();

        let token2 = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            token2.cancel();
        });

        let result = rl.acquire("example.com", &token).await;
        assert!(matches!(result, Err(CrawlError::Cancelled)));
    }
}
