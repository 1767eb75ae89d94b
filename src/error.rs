//! The error taxonomy crossing the module boundaries described in the design.
//!
//! `anyhow` is still used for construction-time failures (a collaborator that
//! fails to initialize); everything that a caller needs to match on gets a
//! `CrawlError` variant instead.

use thiserror::Error;

/// Errors that can surface from the fetch client, robots policy, frontier
/// controller, or worker pool.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// The URL is structurally invalid, non-http(s), carries a non-standard
    /// port, or has an IP-literal host. Dropped silently at the boundary by
    /// callers; kept as a variant so tests can assert on it directly.
    #[error("url normalization failed: {0}")]
    Normalization(String),

    /// DNS, TCP, TLS, or body-read failure, including a request timeout.
    /// Not retried by the retry ladder (only HTTP status triggers retry).
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    /// A non-retryable status, or a retryable one with the retry budget
    /// exhausted.
    #[error("http error: status {status}")]
    Http {
        /// The final status code observed.
        status: u16,
    },

    /// The datastore rejected or failed to execute a batch. The caller
    /// continues; the affected batch is lost.
    #[error("datastore error: {0}")]
    Datastore(String),

    /// Cooperative cancellation fired while the caller was waiting. Never
    /// logged as an error by convention (see the design's error taxonomy).
    #[error("cancelled")]
    Cancelled,
}

impl CrawlError {
    /// True for the one failure mode that must never be logged at error
    /// level and must never unwind more than the current task.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CrawlError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;
