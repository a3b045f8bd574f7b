//! Work functions and the heartbeat/work scope.
//!
//! Once a lock is held two activities run side by side: the heartbeat, which
//! keeps the lease alive, and the caller's work. Each gets its own child of
//! the caller's [`CancellationToken`]:
//!
//! - the heartbeat finishing (lease lost, renewal failed) cancels the work
//! - the work finishing (either way) cancels the heartbeat
//! - cancelling the caller's token cancels both
//!
//! The scope only returns once both have stopped.

use std::{future::Future, sync::Arc};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Boxed future returned by a [`WorkFn`].
pub type WorkFuture = BoxFuture<'static, anyhow::Result<()>>;

/// Caller-supplied work that can be run more than once, e.g. by an
/// [`Election`](crate::election::Election). The token passed in is cancelled
/// when the work should stop.
pub type WorkFn = Arc<dyn Fn(CancellationToken) -> WorkFuture + Send + Sync>;

/// Box an async closure into a [`WorkFn`].
///
/// ```
/// use leasehold_core::work::work_fn;
///
/// let leader = work_fn(|token| async move {
///     token.cancelled().await;
///     Ok(())
/// });
/// ```
pub fn work_fn<F, Fut>(f: F) -> WorkFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |token: CancellationToken| Box::pin(f(token)) as WorkFuture)
}

/// Run `heartbeat` on its own task and `work` on the current one, each
/// cancelling the other when it finishes. Returns the work's output after
/// the heartbeat task has exited.
pub(crate) async fn scoped<H, HFut, W, WFut>(
    parent: &CancellationToken,
    heartbeat: H,
    work: W,
) -> WFut::Output
where
    H: FnOnce(CancellationToken) -> HFut,
    HFut: Future<Output = ()> + Send + 'static,
    W: FnOnce(CancellationToken) -> WFut,
    WFut: Future,
{
    let heartbeat_token = parent.child_token();
    let work_token = parent.child_token();

    let beat = heartbeat(heartbeat_token.clone());
    let cancel_work = work_token.clone();
    let handle = tokio::spawn(async move {
        // cancels work on return and on panic
        let _guard = cancel_work.drop_guard();
        beat.await;
    });

    let out = {
        // also fires if this future is dropped mid-work
        let _guard = heartbeat_token.drop_guard();
        work(work_token).await
    };

    if let Err(err) = handle.await {
        error!(?err, "heartbeat task did not exit cleanly");
    }
    out
}
