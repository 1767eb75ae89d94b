//! The persistence boundary: page/link storage and "what to crawl next"
//! selection, behind one trait so a real backend (Postgres, in the
//! original) can be swapped in without touching the frontier or worker
//! pool.
//!
//! The SQL bodies of a real backend are out of scope here; what matters is
//! the shape of the three calls a backend must support and the atomicity
//! guarantee on the selection call: a page is stamped visited in the same
//! operation that hands it to a worker, not after the worker finishes.

use crate::url_policy::NormalizedUrl;
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexSet;
use std::sync::Mutex;

/// One page's outbound links, as observed during a single crawl.
#[derive(Debug, Clone)]
pub struct LinkGroup {
    pub from: NormalizedUrl,
    pub to: Vec<NormalizedUrl>,
}

/// A single directed edge, the unit the datastore actually bulk-inserts.
#[derive(Debug, Clone)]
pub struct Link {
    pub from: NormalizedUrl,
    pub to: NormalizedUrl,
}

/// The persistence boundary for pages and links. Implementations own their
/// own locking and batching; the frontier controller calls through this
/// trait without assuming either.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Insert `pages` if new; a page already known is left untouched
    /// (idempotent seeding).
    async fn upsert_pages(&self, pages: &[NormalizedUrl]) -> crate::error::Result<()>;

    /// Bulk-insert directed edges, inserting the `to` endpoints as pages if
    /// they are new.
    async fn upsert_links(&self, links: &[Link]) -> crate::error::Result<()>;

    /// Atomically select up to `limit` unvisited pages and stamp them
    /// visited in the same call, so two concurrent callers never receive
    /// the same page and a page that is handed to a worker is already
    /// recorded as visited before the worker does anything with it —
    /// whether or not the crawl that follows succeeds.
    async fn select_and_mark_next(&self, limit: usize) -> crate::error::Result<Vec<NormalizedUrl>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageState {
    Pending,
    Visited,
}

struct PageRecord {
    state: PageState,
}

/// In-memory reference [`Datastore`], used by this crate's own tests and by
/// the `demos/crawl.rs` binary. Not intended as a production backend — it
/// has no persistence and no bounded memory.
#[derive(Default)]
pub struct InMemoryDatastore {
    pages: DashMap<String, PageRecord>,
    links: Mutex<Vec<Link>>,
    /// Host-reversed insertion order, used by `select_and_mark_next` to
    /// round-robin across hosts instead of draining one host's pages
    /// first.
    host_order: Mutex<IndexSet<String>>,
    host_pending: DashMap<String, Vec<String>>,
}

impl InMemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert_pending(&self, url: &NormalizedUrl) {
        let key = url.as_str().to_string();
        let inserted = self
            .pages
            .insert(key.clone(), PageRecord {
                state: PageState::Pending,
            });
        if inserted.is_some() {
            return;
        }
        let host = url.host_reversed();
        self.host_order.lock().unwrap().insert(host.clone());
        self.host_pending.entry(host).or_default().push(key);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.lock().unwrap().len()
    }

    pub fn is_visited(&self, url: &NormalizedUrl) -> bool {
        self.pages
            .get(url.as_str())
            .map(|r| r.state == PageState::Visited)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn upsert_pages(&self, pages: &[NormalizedUrl]) -> crate::error::Result<()> {
        for page in pages {
            if !self.pages.contains_key(page.as_str()) {
                self.insert_pending(page);
            }
        }
        Ok(())
    }

    async fn upsert_links(&self, links: &[Link]) -> crate::error::Result<()> {
        for link in links {
            if !self.pages.contains_key(link.to.as_str()) {
                self.insert_pending(&link.to);
            }
        }
        self.links.lock().unwrap().extend_from_slice(links);
        Ok(())
    }

    async fn select_and_mark_next(&self, limit: usize) -> crate::error::Result<Vec<NormalizedUrl>> {
        use rand::seq::SliceRandom;
        let mut hosts: Vec<String> = self.host_order.lock().unwrap().iter().cloned().collect();
        // Shuffle so a batch doesn't always drain hosts in insertion order,
        // so one host's backlog can't monopolize a selection round.
        hosts.shuffle(&mut rand::thread_rng());
        let mut out = Vec::with_capacity(limit);

        'outer: loop {
            let mut progressed = false;
            for host in &hosts {
                if out.len() >= limit {
                    break 'outer;
                }
                let mut pending = match self.host_pending.get_mut(host) {
                    Some(p) => p,
                    None => continue,
                };
                while let Some(key) = pending.pop() {
                    // Stamp the page visited here, at selection time, not
                    // after the worker finishes with it — a page that is
                    // selected and then fails its crawl is still visited,
                    // never re-offered.
                    let selected = self
                        .pages
                        .get_mut(&key)
                        .map(|mut r| {
                            if r.state == PageState::Pending {
                                r.state = PageState::Visited;
                                true
                            } else {
                                false
                            }
                        })
                        .unwrap_or(false);
                    if selected {
                        out.push(
                            crate::url_policy::normalize(&key)
                                .expect("keys are always previously-normalized URLs"),
                        );
                        progressed = true;
                        break;
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        Ok(out)
    }
}
