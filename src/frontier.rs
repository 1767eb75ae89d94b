//! The frontier controller: a batched writer in front of the datastore, and
//! a `next()` producer that drains `select_and_mark_next` into a channel.
//!
//! Runs as two `tokio` tasks driven by an `mpsc` channel pair: a writer that
//! batches `add()` calls and flushes on whichever comes first — the batch
//! filling, a one-second idle timeout, or cancellation — and a producer
//! that repeatedly pulls newly-visited pages and forwards them to workers.
//! A page becomes visited the moment the producer selects it, not when the
//! writer later records its links, so a shutdown that drops buffered links
//! never leaves a page stuck in limbo.

use crate::cancellation::cancellable;
use crate::datastore::{Datastore, Link, LinkGroup};
use crate::url_policy::NormalizedUrl;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Handle to a running frontier: `add()` enqueues a page's outbound links
/// for the batched writer, `next()` pulls the next page to crawl.
pub struct FrontierController {
    add_tx: mpsc::Sender<LinkGroup>,
    next_rx: tokio::sync::Mutex<mpsc::Receiver<NormalizedUrl>>,
}

impl FrontierController {
    /// Seed the datastore and spawn the writer and producer tasks.
    /// `cancellation` governs both: once fired, the writer flushes its
    /// partial batch and the producer stops pulling new work.
    pub async fn start<D: Datastore + 'static>(
        datastore: Arc<D>,
        config: &crate::config::Config,
        cancellation: CancellationToken,
        seeds: &[NormalizedUrl],
    ) -> crate::error::Result<Self> {
        datastore.upsert_pages(seeds).await?;

        let (add_tx, add_rx) = mpsc::channel(config.frontier_batch_size);
        let (next_tx, next_rx) = mpsc::channel(config.frontier_select_limit);

        tokio::spawn(write_loop(
            datastore.clone(),
            add_rx,
            config.frontier_batch_size,
            config.frontier_flush_interval,
            cancellation.clone(),
        ));
        tokio::spawn(next_loop(
            datastore,
            next_tx,
            config.frontier_select_limit,
            cancellation,
        ));

        Ok(Self {
            add_tx,
            next_rx: tokio::sync::Mutex::new(next_rx),
        })
    }

    /// Enqueue one page's outbound links. Never blocks on the datastore
    /// itself; only backpressures against the writer's channel.
    pub async fn add(&self, group: LinkGroup) -> crate::error::Result<()> {
        self.add_tx
            .send(group)
            .await
            .map_err(|_| crate::error::CrawlError::Cancelled)
    }

    /// The next page to crawl, or `None` once the producer has stopped
    /// (cancellation fired and the channel drained).
    pub async fn next(&self) -> Option<NormalizedUrl> {
        self.next_rx.lock().await.recv().await
    }
}

/// Batches `add()` calls (BATCH_SIZE=64 by default) and flushes to the
/// datastore on whichever comes first: the batch filling, a one-second
/// idle timeout, or cancellation. The idle timeout exists so that a link
/// batch below batch size still reaches the datastore in bounded time
/// instead of waiting indefinitely for more pages to arrive.
async fn write_loop<D: Datastore>(
    datastore: Arc<D>,
    mut add_rx: mpsc::Receiver<LinkGroup>,
    batch_size: usize,
    flush_interval: std::time::Duration,
    cancellation: CancellationToken,
) {
    let mut pending_links: Vec<Link> = Vec::with_capacity(batch_size);

    loop {
        tokio::select! {
            biased;
            _ = cancellation.cancelled() => {
                flush(&datastore, &mut pending_links).await;
                return;
            }
            maybe_group = add_rx.recv() => {
                match maybe_group {
                    None => {
                        flush(&datastore, &mut pending_links).await;
                        return;
                    }
                    Some(group) => {
                        for to in group.to {
                            pending_links.push(Link { from: group.from.clone(), to });
                        }
                        if pending_links.len() >= batch_size {
                            flush(&datastore, &mut pending_links).await;
                        }
                    }
                }
            }
            _ = tokio::time::sleep(flush_interval) => {
                flush(&datastore, &mut pending_links).await;
            }
        }
    }
}

async fn flush<D: Datastore>(datastore: &Arc<D>, links: &mut Vec<Link>) {
    if !links.is_empty() {
        if let Err(err) = datastore.upsert_links(links).await {
            tracing::error!(?err, "failed to upsert a link batch");
        }
        links.clear();
    }
}

/// Repeatedly calls `select_and_mark_next` and forwards each result onto
/// `next_tx`, backing off briefly when the datastore has nothing pending
/// so an empty frontier does not spin.
async fn next_loop<D: Datastore>(
    datastore: Arc<D>,
    next_tx: mpsc::Sender<NormalizedUrl>,
    select_limit: usize,
    cancellation: CancellationToken,
) {
    loop {
        let rows = match cancellable(&cancellation, datastore.select_and_mark_next(select_limit)).await {
            Ok(Ok(rows)) => rows,
            Ok(Err(err)) => {
                tracing::error!(?err, "failed to select next pages");
                if cancellable(&cancellation, tokio::time::sleep(std::time::Duration::from_millis(100)))
                    .await
                    .is_err()
                {
                    return;
                }
                continue;
            }
            Err(_cancelled) => return,
        };

        if rows.is_empty() {
            if cancellable(&cancellation, tokio::time::sleep(std::time::Duration::from_millis(100)))
                .await
                .is_err()
            {
                return;
            }
            continue;
        }

        for url in rows {
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return,
                send_result = next_tx.send(url) => {
                    if send_result.is_err() {
                        return;
                    }
                }
            }
        }
    }
}
