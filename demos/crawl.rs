//! Thin CLI entry point wiring a real [`HttpFetcher`] and the in-memory
//! reference [`InMemoryDatastore`] into the worker pool against seed URLs
//! passed on the command line.
//!
//! Argument parsing is intentionally minimal: seeds are read directly from
//! `std::env::args`, no flag parsing or config file loading. A real
//! deployment would wire `Config` from its own env/flags layer and call
//! this crate as a library instead.

use backlinks_crawler::{
    AtomicMetrics, Config, CrawlerBuilder, InMemoryDatastore, NormalizedUrl,
};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio_util::sync::CancellationToken;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let seeds: Vec<NormalizedUrl> = std::env::args()
        .skip(1)
        .filter_map(|raw| match backlinks_crawler::normalize(&raw) {
            Ok(url) => Some(url),
            Err(err) => {
                tracing::warn!(%raw, %err, "dropping unparseable seed");
                None
            }
        })
        .collect();

    if seeds.is_empty() {
        anyhow::bail!("at least one seed URL is expected as an argument");
    }

    let token = CancellationToken::new();
    let shutdown_token = token.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown signal received, draining in-flight work");
        shutdown_token.cancel();
    });

    let datastore = Arc::new(InMemoryDatastore::new());
    let crawler = CrawlerBuilder::new(datastore.clone())
        .with_config(Config::default())
        .with_cancellation(token)
        .build(&seeds)
        .await?;

    let metrics = Arc::new(AtomicMetrics::default());
    crawler.run(metrics.clone()).await;

    tracing::info!(
        pages = datastore.page_count(),
        links = datastore.link_count(),
        processed = metrics.processed_url.load(Ordering::Relaxed),
        "crawl finished"
    );

    Ok(())
}
