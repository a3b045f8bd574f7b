//! Lock acquisition, lease renewal and work execution.
//!
//! One call to [`Lock::acquire`]:
//!
//! ```text
//! Idle --query--> [Available|HeldBySomeone] --acquire-or-renew--> Held
//!                                            \--Conflict--> Idle (after one interval, if attempts remain)
//!                                            \--Conflict--> RetriesExhausted
//! Idle --Transport/UnexpectedStatus--> failed, no retry
//! Held --(work completes)--> Released
//! ```
//!
//! While held, a heartbeat task renews the lease every interval. Losing the
//! lease cancels the work but does not change what `acquire` returns; it is
//! reported through [`Lock::subscribe`] as [`LeaseState::Lost`].

use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, debug_span, error, info, trace, warn};

use crate::{
    channel::{QueryStatus, RemoteLockChannel, RenewStatus},
    error::{LockError, LockResult},
    http::HttpLockChannel,
    metrics,
    retry::RetryPolicy,
    work,
};

/// Default time between heartbeats, and between conflicting attempts.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Lease as last seen by this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// not held, either never acquired or released after work finished
    Released,
    /// acquired and being renewed
    Held,
    /// a renewal failed or found another owner while work was running
    Lost,
}

/// A named distributed lock.
///
/// Ownership lives in the remote lock service; the local held flag only
/// stops this instance from being acquired twice at once. Share it behind an
/// `Arc` if several tasks need it.
#[derive(Debug)]
pub struct Lock {
    name: String,
    interval: Duration,
    held: AtomicBool,
    channel: Arc<dyn RemoteLockChannel>,
    state: Arc<watch::Sender<LeaseState>>,
}

impl Lock {
    /// Create a lock on `name` that renews every `interval` through `channel`.
    pub fn new(
        name: impl Into<String>,
        interval: Duration,
        channel: impl RemoteLockChannel,
    ) -> Self {
        Self::with_channel(name, interval, Arc::new(channel))
    }

    /// Like [`Lock::new`] with an already shared channel.
    pub fn with_channel(
        name: impl Into<String>,
        interval: Duration,
        channel: Arc<dyn RemoteLockChannel>,
    ) -> Self {
        let (state, _) = watch::channel(LeaseState::Released);
        Self {
            name: name.into(),
            interval,
            held: AtomicBool::new(false),
            channel,
            state: Arc::new(state),
        }
    }

    /// Create a lock talking to the lock service at `base_url` over HTTP.
    pub fn with_http(
        name: impl Into<String>,
        base_url: impl Into<String>,
        interval: Duration,
        request_timeout: Duration,
    ) -> LockResult<Self> {
        Ok(Self::new(
            name,
            interval,
            HttpLockChannel::new(base_url, request_timeout)?,
        ))
    }

    /// Resource name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Renewal interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// True while an `acquire` call is in progress on this instance.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }

    /// Watch lease transitions. A `Lost` value stays until the next
    /// successful acquisition.
    pub fn subscribe(&self) -> watch::Receiver<LeaseState> {
        self.state.subscribe()
    }

    /// Acquire the lock, run `work` while renewing the lease, then release.
    ///
    /// `work` receives a token that is cancelled when the lease is lost or
    /// `token` is cancelled. Its error, if any, comes back as
    /// [`LockError::Work`]. Returns [`LockError::Reentrant`] without any
    /// network call if this instance is already in use.
    pub async fn acquire<F, Fut, T>(
        &self,
        token: &CancellationToken,
        policy: RetryPolicy,
        work: F,
    ) -> LockResult<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let mut guard = self.claim()?;

        match cancellable(token, self.channel.query(&self.name)).await? {
            QueryStatus::Available => debug!(lock = %self.name, "lock not found, acquiring"),
            QueryStatus::HeldBySomeone => debug!(lock = %self.name, "lock exists, acquiring"),
        }

        self.acquire_with_retry(token, policy).await?;
        guard.mark_held();
        info!(lock = %self.name, "lock acquired");

        let heartbeat = Heartbeat {
            name: self.name.clone(),
            interval: self.interval,
            channel: self.channel.clone(),
            state: self.state.clone(),
        };
        let span = debug_span!("heartbeat", lock = %self.name);
        let res = work::scoped(
            token,
            move |beat_token| heartbeat.run(beat_token).instrument(span),
            work,
        )
        .await;

        debug!(lock = %self.name, ok = res.is_ok(), "work finished, releasing lock");
        res.map_err(LockError::Work)
    }

    async fn acquire_with_retry(
        &self,
        token: &CancellationToken,
        policy: RetryPolicy,
    ) -> LockResult<()> {
        let mut budget = policy.budget();
        loop {
            budget.record_attempt();
            match self.try_acquire(token).await {
                Ok(()) => {
                    metrics::LOCK_ACQUIRED.inc();
                    return Ok(());
                }
                Err(err) if err.is_retryable() => {
                    metrics::LOCK_ACQUIRE_CONFLICTS.inc();
                    if !budget.has_remaining() {
                        metrics::LOCK_RETRIES_EXHAUSTED.inc();
                        warn!(lock = %self.name, attempts = budget.attempts(), %policy, "giving up on lock");
                        return Err(LockError::RetriesExhausted {
                            attempts: budget.attempts(),
                        });
                    }
                    debug!(
                        lock = %self.name,
                        attempt = budget.attempts(),
                        retry_in_ms = self.interval.as_millis(),
                        "lock held elsewhere, retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(LockError::Cancelled),
                        _ = tokio::time::sleep(self.interval) => {}
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_acquire(&self, token: &CancellationToken) -> LockResult<()> {
        metrics::LOCK_ACQUIRE_ATTEMPTS.inc();
        match cancellable(token, self.channel.acquire_or_renew(&self.name)).await? {
            RenewStatus::Acquired => Ok(()),
            RenewStatus::Conflict => Err(LockError::Conflict {
                name: self.name.clone(),
            }),
        }
    }

    fn claim(&self) -> LockResult<HeldGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| LockError::Reentrant {
                name: self.name.clone(),
            })?;
        Ok(HeldGuard {
            lock: self,
            acquired: false,
        })
    }
}

/// Clears the held flag when an `acquire` call ends, however it ends.
struct HeldGuard<'a> {
    lock: &'a Lock,
    acquired: bool,
}

impl HeldGuard<'_> {
    fn mark_held(&mut self) {
        self.acquired = true;
        metrics::LOCKS_HELD.inc();
        self.lock.state.send_replace(LeaseState::Held);
    }
}

impl Drop for HeldGuard<'_> {
    fn drop(&mut self) {
        if self.acquired {
            metrics::LOCKS_HELD.dec();
            self.lock.state.send_if_modified(|state| {
                if *state == LeaseState::Held {
                    *state = LeaseState::Released;
                    true
                } else {
                    false
                }
            });
        }
        self.lock.held.store(false, Ordering::Release);
    }
}

/// Lease renewal loop, owned by the spawned heartbeat task.
struct Heartbeat {
    name: String,
    interval: Duration,
    channel: Arc<dyn RemoteLockChannel>,
    state: Arc<watch::Sender<LeaseState>>,
}

impl Heartbeat {
    async fn run(self, token: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    trace!("heartbeat stopping");
                    return;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            match cancellable(&token, self.channel.acquire_or_renew(&self.name)).await {
                Ok(RenewStatus::Acquired) => {
                    metrics::LOCK_RENEWALS.inc();
                    trace!("lease renewed");
                }
                Ok(RenewStatus::Conflict) => {
                    warn!("lease lost to another owner, cancelling work");
                    self.lost();
                    return;
                }
                Err(LockError::Cancelled) => return,
                Err(err) => {
                    error!(?err, "lease renewal failed, cancelling work");
                    self.lost();
                    return;
                }
            }
        }
    }

    fn lost(&self) {
        metrics::LOCK_LEASES_LOST.inc();
        self.state.send_replace(LeaseState::Lost);
    }
}

/// Race `fut` against `token`.
async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = LockResult<T>>,
) -> LockResult<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(LockError::Cancelled),
        res = fut => res,
    }
}
