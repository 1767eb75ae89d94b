//! Robots policy: one fetch per host for the lifetime of the process,
//! evaluated against `robotstxt`.
//!
//! Concurrent lookups for the same host share one `robots.txt` fetch: the
//! first caller populates the cache entry under its lock, and every other
//! caller blocked on that same lock observes the already-fetched result
//! instead of issuing a second request.

use crate::error::{CrawlError, Result};
use crate::fetch::Fetcher;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A robots.txt body that failed to load, is absent, or was not plain text
/// is treated as "everything allowed" — the same sentinel behavior as the
/// Go original's `#failed-to-get-robot.txt` placeholder.
const ALLOW_ALL: &str = "";

/// Whether a path on a host may be crawled by `user_agent`.
#[async_trait]
pub trait RobotPolicy: Send + Sync {
    async fn is_allowed(&self, scheme: &str, host: &str, path: &str) -> Result<bool>;
}

/// Per-host cache entry: the body once fetched (or the allow-all
/// sentinel), behind a lock that also serializes the first fetch.
struct CacheEntry {
    body: Mutex<Option<String>>,
}

/// `robotstxt`-backed [`RobotPolicy`] with a single-flight-per-host cache
/// that is never invalidated or re-fetched within a process lifetime.
pub struct InMemoryRobotPolicy<F: Fetcher> {
    fetcher: Arc<F>,
    cache: DashMap<String, Arc<CacheEntry>>,
    user_agent: String,
    max_body_bytes: usize,
}

impl<F: Fetcher> InMemoryRobotPolicy<F> {
    pub fn new(fetcher: Arc<F>, user_agent: impl Into<String>, max_body_bytes: usize) -> Self {
        Self {
            fetcher,
            cache: DashMap::new(),
            user_agent: user_agent.into(),
            max_body_bytes,
        }
    }

    fn entry_for(&self, host: &str) -> Arc<CacheEntry> {
        self.cache
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(CacheEntry {
                    body: Mutex::new(None),
                })
            })
            .clone()
    }

    /// Return the cached body for `host`, fetching it on first access. Two
    /// concurrent callers for the same host block on the same lock and the
    /// second one observes the first one's result instead of issuing a
    /// second request.
    async fn body_for(&self, scheme: &str, host: &str) -> String {
        let entry = self.entry_for(host);
        let mut guard = entry.body.lock().await;
        if let Some(body) = guard.as_ref() {
            return body.clone();
        }
        let body = self.fetch_robots_txt(scheme, host).await;
        *guard = Some(body.clone());
        body
    }

    async fn fetch_robots_txt(&self, scheme: &str, host: &str) -> String {
        let url = format!("{scheme}://{host}/robots.txt");
        let response = match self.fetcher.get(&url).await {
            Ok(r) => r,
            Err(_) => return ALLOW_ALL.to_string(),
        };

        if response.status() != 200 {
            return ALLOW_ALL.to_string();
        }
        let is_text_plain = response
            .content_type_mime()
            .map(|m| m.type_() == mime::TEXT && m.subtype() == mime::PLAIN)
            .unwrap_or(false);
        if !is_text_plain {
            return ALLOW_ALL.to_string();
        }

        match response.bytes().await {
            Ok(bytes) => {
                let truncated = &bytes[..bytes.len().min(self.max_body_bytes)];
                String::from_utf8_lossy(truncated).into_owned()
            }
            Err(_) => ALLOW_ALL.to_string(),
        }
    }
}

#[async_trait]
impl<F: Fetcher> RobotPolicy for InMemoryRobotPolicy<F> {
    #[tracing::instrument(skip(self))]
    async fn is_allowed(&self, scheme: &str, host: &str, path: &str) -> Result<bool> {
        if host.is_empty() {
            return Err(CrawlError::Normalization("empty host".into()));
        }
        let body = self.body_for(scheme, host).await;
        if body.is_empty() {
            return Ok(true);
        }
        let mut matcher = robotstxt::DefaultMatcher::default();
        Ok(matcher.one_agent_allowed_by_robots(&body, &self.user_agent, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubFetcher {
        body: &'static str,
        status: u16,
        content_type: &'static str,
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Fetcher for StubFetcher {
        async fn head(&self, _url: &str) -> Result<Response> {
            unimplemented!("robots policy only issues GET")
        }

        async fn get(&self, _url: &str) -> Result<Response> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let mut server = mockito::Server::new_async().await;
            let _m = server
                .mock("GET", "/robots.txt")
                .with_status(self.status as usize)
                .with_header("content-type", self.content_type)
                .with_body(self.body)
                .create_async()
                .await;
            let client = reqwest::Client::new();
            let resp = client
                .get(format!("{}/robots.txt", server.url()))
                .send()
                .await
                .unwrap();
            Ok(Response::from_reqwest(resp))
        }
    }

    #[tokio::test]
    async fn disallow_rule_blocks_matching_path() {
        let fetcher = Arc::new(StubFetcher {
            body: "User-agent: *\nDisallow: /private\n",
            status: 200,
            content_type: "text/plain",
            hits: AtomicUsize::new(0),
        });
        let policy = InMemoryRobotPolicy::new(fetcher, "BacklinksCrawler/0.1", 512 * 1024);
        assert!(!policy
            .is_allowed("http", "example.com", "/private/page")
            .await
            .unwrap());
        assert!(policy
            .is_allowed("http", "example.com", "/public")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn second_lookup_for_same_host_does_not_refetch() {
        let fetcher = Arc::new(StubFetcher {
            body: "User-agent: *\nDisallow:\n",
            status: 200,
            content_type: "text/plain",
            hits: AtomicUsize::new(0),
        });
        let policy = InMemoryRobotPolicy::new(fetcher.clone(), "BacklinksCrawler/0.1", 512 * 1024);
        policy.is_allowed("http", "example.com", "/a").await.unwrap();
        policy.is_allowed("http", "example.com", "/b").await.unwrap();
        assert_eq!(fetcher.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn non_200_status_allows_everything() {
        let fetcher = Arc::new(StubFetcher {
            body: "User-agent: *\nDisallow: /\n",
            status: 404,
            content_type: "text/plain",
            hits: AtomicUsize::new(0),
        });
        let policy = InMemoryRobotPolicy::new(fetcher, "BacklinksCrawler/0.1", 512 * 1024);
        assert!(policy.is_allowed("http", "example.com", "/x").await.unwrap());
    }

    #[tokio::test]
    async fn non_text_content_type_allows_everything() {
        let fetcher = Arc::new(StubFetcher {
            body: "User-agent: *\nDisallow: /\n",
            status: 200,
            content_type: "application/octet-stream",
            hits: AtomicUsize::new(0),
        });
        let policy = InMemoryRobotPolicy::new(fetcher, "BacklinksCrawler/0.1", 512 * 1024);
        assert!(policy.is_allowed("http", "example.com", "/x").await.unwrap());
    }
}
