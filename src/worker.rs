//! The crawl worker pool: joins robots policy, fetch client, and frontier
//! controller into the per-URL crawl protocol (robots check, HEAD, GET,
//! parse, record), bounding total concurrency with a semaphore.
//!
//! Each URL gets its own bounded task gated by a `tokio::sync::Semaphore`,
//! pulling work from `FrontierController::next()` rather than recursing
//! into freshly discovered links — link discovery and dispatch are
//! decoupled, so the frontier can reorder, dedupe, and batch work across
//! hosts instead of a single page's links dictating what gets crawled
//! next.

use crate::cancellation::cancellable;
use crate::datastore::LinkGroup;
use crate::fetch::{Fetcher, Response};
use crate::frontier::FrontierController;
use crate::metrics::Metrics;
use crate::robots::RobotPolicy;
use crate::url_policy::{self, NormalizedUrl};
use indexmap::IndexSet;
use scraper::{Html, Selector};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// A response is crawlable iff its status is a successful body-bearing
/// status, its content-type mentions HTML, and it does not opt out via
/// `x-robots-tag`.
fn crawlable(resp: &Response) -> bool {
    resp.is_success_body()
        && resp.header_contains("content-type", "html")
        && !resp.header_contains("x-robots-tag", "nofollow")
        && !resp.header_contains("x-robots-tag", "noindex")
}

/// Drains a response's body so the underlying connection can be reused,
/// ignoring the body itself and any read error.
async fn drain(resp: Response) {
    let _ = resp.bytes().await;
}

/// Drives the crawl loop. Generic over the three collaborator traits so
/// production and in-memory/test backends are interchangeable.
pub struct WorkerPool<F: Fetcher, R: RobotPolicy, M: Metrics> {
    fetcher: Arc<F>,
    robots: Arc<R>,
    frontier: Arc<FrontierController>,
    metrics: Arc<M>,
    concurrency: Arc<Semaphore>,
    cancellation: CancellationToken,
}

impl<F: Fetcher + 'static, R: RobotPolicy + 'static, M: Metrics + 'static> WorkerPool<F, R, M> {
    pub fn new(
        fetcher: Arc<F>,
        robots: Arc<R>,
        frontier: Arc<FrontierController>,
        metrics: Arc<M>,
        max_concurrency: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            fetcher,
            robots,
            frontier,
            metrics,
            concurrency: Arc::new(Semaphore::new(max_concurrency)),
            cancellation,
        }
    }

    /// Pull URLs from the frontier until it is exhausted (cancellation
    /// closes the channel) or cancellation fires directly, spawning one
    /// bounded task per URL. Returns once every in-flight task has
    /// finished.
    pub async fn run(self: Arc<Self>) {
        let mut tasks = tokio::task::JoinSet::new();

        loop {
            let url = match cancellable(&self.cancellation, self.frontier.next()).await {
                Ok(Some(url)) => url,
                Ok(None) | Err(_) => break,
            };

            let permit = match cancellable(
                &self.cancellation,
                self.concurrency.clone().acquire_owned(),
            )
            .await
            {
                Ok(Ok(permit)) => permit,
                _ => break,
            };

            let pool = self.clone();
            tasks.spawn(async move {
                let _permit = permit;
                pool.process_one(url).await;
            });
        }

        while tasks.join_next().await.is_some() {}
    }

    async fn process_one(&self, url: NormalizedUrl) {
        let start = std::time::Instant::now();

        match self
            .robots
            .is_allowed(&url.scheme(), &url.host(), &url.path())
            .await
        {
            Ok(true) => self.metrics.inc_robot_allowed(),
            Ok(false) => {
                self.metrics.inc_robot_disallowed();
                return;
            }
            Err(err) => {
                if !err.is_cancelled() {
                    tracing::error!(?err, %url, "robots policy lookup failed");
                    self.metrics.inc_errors();
                }
                return;
            }
        }

        let head_resp = match self.fetcher.head(url.as_str()).await {
            Ok(resp) => resp,
            Err(err) => {
                self.log_and_count(&err, &url, "head request failed");
                return;
            }
        };
        if !crawlable(&head_resp) {
            drain(head_resp).await;
            return;
        }
        drain(head_resp).await;

        let get_resp = match self.fetcher.get(url.as_str()).await {
            Ok(resp) => resp,
            Err(err) => {
                self.log_and_count(&err, &url, "get request failed");
                return;
            }
        };
        if !crawlable(&get_resp) {
            drain(get_resp).await;
            return;
        }

        let base = get_resp.url().clone();
        let body = match get_resp.text().await {
            Ok(body) => body,
            Err(err) => {
                self.log_and_count(&err, &url, "failed to read response body");
                return;
            }
        };

        let links = extract_links(&base, &body);
        self.metrics.add_links(links.len() as u64);
        self.metrics.inc_processed_url();
        self.metrics.observe_url_duration(start.elapsed());

        if let Err(err) = self.frontier.add(LinkGroup {
            from: url.clone(),
            to: links.into_iter().collect(),
        }).await {
            if !err.is_cancelled() {
                tracing::error!(?err, %url, "failed to enqueue discovered links");
                self.metrics.inc_errors();
            }
        }
    }

    fn log_and_count(&self, err: &crate::error::CrawlError, url: &NormalizedUrl, msg: &str) {
        if err.is_cancelled() {
            return;
        }
        tracing::error!(?err, %url, "{}", msg);
        self.metrics.inc_errors();
    }
}

/// Extract, absolutize, and normalize every `a[href]` anchor target.
/// `scraper` never fails outright on malformed HTML — it degrades to an
/// empty or partial tree — so a document the parser cannot fully tokenize
/// still yields whatever anchors were found before the failure, and a
/// genuinely malformed document simply yields none.
fn extract_links(base: &url::Url, body: &str) -> IndexSet<NormalizedUrl> {
    let document = Html::parse_document(body);
    let selector = Selector::parse("a[href]").expect("a[href] is a valid CSS selector");

    document
        .select(&selector)
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| url_policy::normalize_relative(base, href).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::datastore::InMemoryDatastore;
    use crate::metrics::AtomicMetrics;
    use crate::robots::InMemoryRobotPolicy;
    use std::sync::atomic::Ordering;

    async fn build_pool(
        server: &mockito::ServerGuard,
    ) -> (
        Arc<WorkerPool<crate::fetch::HttpFetcher, InMemoryRobotPolicy<crate::fetch::HttpFetcher>, AtomicMetrics>>,
        Arc<InMemoryDatastore>,
        Arc<AtomicMetrics>,
        CancellationToken,
    ) {
        let config = Config {
            http_rate_limit: 1000.0,
            ..Config::default()
        };
        let token = CancellationToken::new();
        let fetcher = Arc::new(crate::fetch::HttpFetcher::new(&config, token.clone()).unwrap());
        let robots = Arc::new(InMemoryRobotPolicy::new(
            fetcher.clone(),
            config.user_agent.clone(),
            config.robots_max_body_bytes,
        ));
        let datastore = Arc::new(InMemoryDatastore::new());
        let seed = url_policy::normalize(&format!("{}/", server.url())).unwrap();
        let frontier = Arc::new(
            FrontierController::start(datastore.clone(), &config, token.clone(), &[seed])
                .await
                .unwrap(),
        );
        let metrics = Arc::new(AtomicMetrics::default());
        let pool = Arc::new(WorkerPool::new(
            fetcher,
            robots,
            frontier,
            metrics.clone(),
            4,
            token.clone(),
        ));
        (pool, datastore, metrics, token)
    }

    #[tokio::test]
    async fn s1_extracts_and_normalizes_discovered_links() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server.mock("GET", "/robots.txt").with_status(404).create_async().await;
        let _root = server
            .mock("HEAD", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .create_async()
            .await;
        let _root_get = server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body(r#"<a href="/b">b</a><a href="http://c.test/">c</a>"#)
            .create_async()
            .await;

        let (pool, datastore, metrics, token) = build_pool(&server).await;
        let root = url_policy::normalize(&format!("{}/", server.url())).unwrap();
        pool.process_one(root.clone()).await;
        token.cancel();

        assert_eq!(datastore.link_count(), 2);
        assert_eq!(metrics.links.load(Ordering::SeqCst), 2);
        assert_eq!(metrics.processed_url.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn s3_disallowed_path_skips_head_and_get() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server
            .mock("GET", "/robots.txt")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("User-agent: *\nDisallow: /\n")
            .create_async()
            .await;
        let head_mock = server.mock("HEAD", "/").expect(0).create_async().await;
        let get_mock = server.mock("GET", "/").expect(0).create_async().await;

        let (pool, _datastore, metrics, token) = build_pool(&server).await;
        let root = url_policy::normalize(&format!("{}/", server.url())).unwrap();
        pool.process_one(root).await;
        token.cancel();

        head_mock.assert_async().await;
        get_mock.assert_async().await;
        assert_eq!(metrics.robot_disallowed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn s4_non_html_content_type_records_no_links() {
        let mut server = mockito::Server::new_async().await;
        let _robots = server.mock("GET", "/robots.txt").with_status(404).create_async().await;
        let _head = server
            .mock("HEAD", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .create_async()
            .await;
        let get_mock = server.mock("GET", "/").expect(0).create_async().await;

        let (pool, datastore, _metrics, token) = build_pool(&server).await;
        let root = url_policy::normalize(&format!("{}/", server.url())).unwrap();
        pool.process_one(root).await;
        token.cancel();

        get_mock.assert_async().await;
        assert_eq!(datastore.link_count(), 0);
    }
}
