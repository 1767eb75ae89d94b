//! A horizontally-polite, breadth-first web crawler core.
//!
//! This crate owns the coordination machinery — per-host paced fetching,
//! robots.txt policy, a frontier controller, and a bounded worker pool —
//! that makes crawling at scale both correct and well-behaved. It does not
//! render JavaScript, does not follow non-HTTP(S) schemes, and does not own
//! a relational datastore: those are external collaborators reached
//! through [`Fetcher`], [`RobotPolicy`], and [`Datastore`].

pub mod cancellation;
pub mod config;
pub mod datastore;
pub mod error;
pub mod fetch;
pub mod frontier;
pub mod metrics;
pub mod robots;
pub mod url_policy;
pub mod worker;

pub use config::{Config, ConfigBuilder};
pub use datastore::{Datastore, InMemoryDatastore, Link, LinkGroup};
pub use error::{CrawlError, Result};
pub use fetch::{Fetcher, HttpFetcher, Response};
pub use frontier::FrontierController;
pub use metrics::{AtomicMetrics, Metrics, NoopMetrics};
pub use robots::{InMemoryRobotPolicy, RobotPolicy};
pub use url_policy::{normalize, reverse_host, NormalizedUrl};
pub use worker::WorkerPool;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Builder for [`Crawler`]: a plain config struct collected fluently, then
/// consumed once to build the wired-up crawler.
pub struct CrawlerBuilder<D: Datastore> {
    config: Config,
    datastore: Arc<D>,
    cancellation: CancellationToken,
}

impl<D: Datastore + 'static> CrawlerBuilder<D> {
    pub fn new(datastore: Arc<D>) -> Self {
        Self {
            config: Config::default(),
            datastore,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Share a cancellation token with an external shutdown signal instead
    /// of letting the builder create its own.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Wire the fetch client, robots policy, and frontier controller
    /// together and seed the frontier. The returned [`Crawler`] is ready
    /// for [`Crawler::run`].
    pub async fn build(self, seeds: &[NormalizedUrl]) -> anyhow::Result<Crawler<D>> {
        let fetcher = Arc::new(HttpFetcher::new(&self.config, self.cancellation.clone())?);
        let robots = Arc::new(InMemoryRobotPolicy::new(
            fetcher.clone(),
            self.config.user_agent.clone(),
            self.config.robots_max_body_bytes,
        ));
        let frontier = Arc::new(
            FrontierController::start(
                self.datastore.clone(),
                &self.config,
                self.cancellation.clone(),
                seeds,
            )
            .await?,
        );

        Ok(Crawler {
            frontier,
            pool_builder: PoolBuilder {
                fetcher,
                robots,
                max_concurrency: self.config.crawler_max_concurrency,
                cancellation: self.cancellation,
            },
            datastore: std::marker::PhantomData,
        })
    }
}

/// Captures the pieces `run` needs to build a [`WorkerPool`] once it also
/// has a [`Metrics`] sink, which is supplied only at `run` time so callers
/// are not forced to pick one at `build` time.
struct PoolBuilder {
    fetcher: Arc<HttpFetcher>,
    robots: Arc<InMemoryRobotPolicy<HttpFetcher>>,
    max_concurrency: usize,
    cancellation: CancellationToken,
}

/// A fully wired crawler: fetch client, robots policy, and frontier
/// controller already running, waiting for [`Crawler::run`] to drive the
/// worker pool against a telemetry sink.
pub struct Crawler<D: Datastore> {
    frontier: Arc<FrontierController>,
    pool_builder: PoolBuilder,
    #[allow(dead_code)]
    datastore: std::marker::PhantomData<D>,
}

impl<D: Datastore + 'static> Crawler<D> {
    /// Run the worker pool to completion: until the frontier is exhausted
    /// or the shared cancellation token fires.
    pub async fn run<M: Metrics + 'static>(self, metrics: Arc<M>) {
        let pool = Arc::new(WorkerPool::new(
            self.pool_builder.fetcher,
            self.pool_builder.robots,
            self.frontier,
            metrics,
            self.pool_builder.max_concurrency,
            self.pool_builder.cancellation,
        ));
        pool.run().await;
    }
}
