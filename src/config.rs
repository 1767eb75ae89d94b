//! Crawler configuration: the tunables shared across the fetch client,
//! robots policy, frontier controller, and worker pool, collected into one
//! struct with sane defaults and a fluent builder.
//!
//! Loading these from `.env` or CLI flags is out of scope here — that is the
//! external collaborator's job. This module only owns the struct and its
//! defaults.

const DEFAULT_USER_AGENT: &str = "BacklinksCrawler/0.1";
const DEFAULT_HTTP_RATE_LIMIT: f64 = 0.2; // one request per five seconds
const DEFAULT_HTTP_MAX_RETRY: usize = 3;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 180;
const DEFAULT_MAX_CONCURRENCY: usize = 1024;
const DEFAULT_ROBOTS_MAX_BODY_BYTES: usize = 512 * 1024;
const DEFAULT_FRONTIER_BATCH_SIZE: usize = 64;
const DEFAULT_FRONTIER_FLUSH_INTERVAL_SECS: u64 = 1;
const DEFAULT_FRONTIER_SELECT_LIMIT: usize = 256;

/// Configuration parameters shared by the fetch client, robots policy,
/// frontier controller, and worker pool.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed string used both as the HTTP `User-Agent` header and as the
    /// robots.txt agent token.
    pub user_agent: String,
    /// Initial per-host permit rate, in requests per second. Default
    /// `0.2` (one request per five seconds).
    pub http_rate_limit: f64,
    /// Number of retries for a retryable status, beyond the initial
    /// attempt.
    pub http_max_retry: usize,
    /// Wall-clock deadline for a single request.
    pub http_timeout: std::time::Duration,
    /// Total in-flight crawl tasks allowed at once.
    pub crawler_max_concurrency: usize,
    /// Robots.txt bodies longer than this are truncated.
    pub robots_max_body_bytes: usize,
    /// Frontier add-buffer flush threshold.
    pub frontier_batch_size: usize,
    /// Frontier add-buffer idle flush timeout.
    pub frontier_flush_interval: std::time::Duration,
    /// Upper bound on how many unvisited pages `next()` asks the
    /// datastore for in one call.
    pub frontier_select_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.into(),
            http_rate_limit: DEFAULT_HTTP_RATE_LIMIT,
            http_max_retry: DEFAULT_HTTP_MAX_RETRY,
            http_timeout: std::time::Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            crawler_max_concurrency: DEFAULT_MAX_CONCURRENCY,
            robots_max_body_bytes: DEFAULT_ROBOTS_MAX_BODY_BYTES,
            frontier_batch_size: DEFAULT_FRONTIER_BATCH_SIZE,
            frontier_flush_interval: std::time::Duration::from_secs(
                DEFAULT_FRONTIER_FLUSH_INTERVAL_SECS,
            ),
            frontier_select_limit: DEFAULT_FRONTIER_SELECT_LIMIT,
        }
    }
}

/// Builder for [`Config`]: a plain struct with a `Default` impl, collected
/// fluently and consumed once.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn with_user_agent<S: AsRef<str>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.as_ref().into();
        self
    }

    pub fn with_http_rate_limit(mut self, rate: f64) -> Self {
        self.config.http_rate_limit = rate;
        self
    }

    pub fn with_http_max_retry(mut self, retries: usize) -> Self {
        self.config.http_max_retry = retries;
        self
    }

    pub fn with_http_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn with_crawler_max_concurrency(mut self, concurrency: usize) -> Self {
        self.config.crawler_max_concurrency = concurrency;
        self
    }

    pub fn with_frontier_batch_size(mut self, size: usize) -> Self {
        self.config.frontier_batch_size = size;
        self
    }

    pub fn with_frontier_flush_interval(mut self, interval: std::time::Duration) -> Self {
        self.config.frontier_flush_interval = interval;
        self
    }

    pub fn with_frontier_select_limit(mut self, limit: usize) -> Self {
        self.config.frontier_select_limit = limit;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
