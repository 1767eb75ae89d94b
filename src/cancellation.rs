//! Process-wide cooperative cancellation, observable by every suspending
//! operation in the fetch client, robots policy, frontier controller, and
//! worker pool.
//!
//! `tokio_util::sync::CancellationToken` already gives structured,
//! clone-and-fan-out cancellation (a parent token cancels every child) — the
//! same shape `linkerd-linkerd2` and several crawlers in the reference pack
//! use for graceful shutdown, so it is used directly rather than
//! reinvented.

use crate::error::CrawlError;
use tokio_util::sync::CancellationToken;

/// Race a future against the token; map cancellation to [`CrawlError::Cancelled`].
pub async fn cancellable<F, T>(token: &CancellationToken, fut: F) -> Result<T, CrawlError>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CrawlError::Cancelled),
        out = fut => Ok(out),
    }
}
