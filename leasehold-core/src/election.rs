//! Leader/follower election on top of a lock.
//!
//! Whoever acquires the lock runs the leader work while holding it. Everyone
//! else runs the follower work. A leader whose work fails also falls through
//! to the follower work: from the election's point of view "never acquired"
//! and "acquired but the leader work failed" are the same branch.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    error::{LockError, LockResult},
    lock::Lock,
    retry::RetryPolicy,
    work::WorkFn,
};

/// Anything that can attempt acquisition and run work while holding the lock.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Acquire, run `work` while held, release. Returns the work's result
    /// or the reason acquisition failed.
    async fn lock(
        &self,
        token: &CancellationToken,
        policy: RetryPolicy,
        work: WorkFn,
    ) -> LockResult<()>;
}

#[async_trait]
impl Locker for Lock {
    async fn lock(
        &self,
        token: &CancellationToken,
        policy: RetryPolicy,
        work: WorkFn,
    ) -> LockResult<()> {
        self.acquire(token, policy, move |token| work(token)).await
    }
}

#[async_trait]
impl<L: Locker + ?Sized> Locker for Arc<L> {
    async fn lock(
        &self,
        token: &CancellationToken,
        policy: RetryPolicy,
        work: WorkFn,
    ) -> LockResult<()> {
        (**self).lock(token, policy, work).await
    }
}

/// A lock paired with leader and follower work.
pub struct Election<L> {
    locker: L,
    policy: RetryPolicy,
    leader: WorkFn,
    follower: WorkFn,
}

impl<L> std::fmt::Debug for Election<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Election")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<L: Locker> Election<L> {
    /// New election making a single acquisition attempt per run.
    pub fn new(locker: L, leader: WorkFn, follower: WorkFn) -> Self {
        Self {
            locker,
            policy: RetryPolicy::default(),
            leader,
            follower,
        }
    }

    /// Use `policy` for each run's acquisition.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The lock this election runs on.
    pub fn locker(&self) -> &L {
        &self.locker
    }

    /// Run one election round.
    ///
    /// Returns `Ok(())` if we led and the leader work succeeded, otherwise
    /// the result of the follower work.
    pub async fn run(&self, token: &CancellationToken) -> anyhow::Result<()> {
        match self
            .locker
            .lock(token, self.policy, self.leader.clone())
            .await
        {
            Ok(()) => {
                info!("leader work finished");
                Ok(())
            }
            Err(LockError::Work(err)) => {
                warn!(error = %err, "leader work failed, running follower work");
                (self.follower)(token.child_token()).await
            }
            Err(err) => {
                debug!(%err, "not leader, running follower work");
                (self.follower)(token.child_token()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tracing_test::traced_test;

    use super::*;
    use crate::{memory::MemoryLockService, work::work_fn};

    #[derive(Debug, Clone, Copy)]
    enum Script {
        NeverAcquired,
        Acquired,
    }

    #[derive(Debug)]
    struct ScriptedLocker(Script);

    #[async_trait]
    impl Locker for ScriptedLocker {
        async fn lock(
            &self,
            token: &CancellationToken,
            _policy: RetryPolicy,
            work: WorkFn,
        ) -> LockResult<()> {
            match self.0 {
                Script::NeverAcquired => Err(LockError::RetriesExhausted { attempts: 1 }),
                Script::Acquired => work(token.child_token()).await.map_err(LockError::Work),
            }
        }
    }

    fn counting(counter: &Arc<AtomicUsize>, fail: bool) -> WorkFn {
        let counter = counter.clone();
        work_fn(move |_token| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                if fail {
                    anyhow::bail!("work failed");
                }
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn test_leader_success_skips_follower() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let election = Election::new(
            ScriptedLocker(Script::Acquired),
            counting(&leader, false),
            counting(&follower, false),
        );

        election.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(leader.load(Ordering::SeqCst), 1);
        assert_eq!(follower.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_not_acquired_runs_follower() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let election = Election::new(
            ScriptedLocker(Script::NeverAcquired),
            counting(&leader, false),
            counting(&follower, false),
        );

        election.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(leader.load(Ordering::SeqCst), 0);
        assert_eq!(follower.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_failed_leader_falls_through_to_follower() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let election = Election::new(
            ScriptedLocker(Script::Acquired),
            counting(&leader, true),
            counting(&follower, false),
        );

        // same outcome as never acquiring: the follower's result
        election.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(leader.load(Ordering::SeqCst), 1);
        assert_eq!(follower.load(Ordering::SeqCst), 1);
        assert!(logs_contain("leader work failed"));
    }

    #[tokio::test]
    async fn test_follower_error_is_returned() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let election = Election::new(
            ScriptedLocker(Script::NeverAcquired),
            counting(&leader, false),
            counting(&follower, true),
        );

        let err = election.run(&CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "work failed");
    }

    #[tokio::test]
    async fn test_run_is_repeatable() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let service = MemoryLockService::new(Duration::from_secs(30));
        let lock = Lock::new("repeat", Duration::from_secs(10), service.channel("a"));
        let election = Election::new(lock, counting(&leader, false), counting(&follower, false));

        let token = CancellationToken::new();
        election.run(&token).await.unwrap();
        election.run(&token).await.unwrap();
        assert_eq!(leader.load(Ordering::SeqCst), 2);
        assert_eq!(follower.load(Ordering::SeqCst), 0);
        assert!(!election.locker().is_held());
    }

    #[tokio::test]
    #[traced_test]
    async fn test_acquired_lock_with_failing_leader_runs_follower() {
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let service = MemoryLockService::new(Duration::from_secs(30));
        let lock = Lock::new("migrate", Duration::from_secs(10), service.channel("a"));
        let election = Election::new(lock, counting(&leader, true), counting(&follower, false));

        election.run(&CancellationToken::new()).await.unwrap();
        assert_eq!(leader.load(Ordering::SeqCst), 1);
        assert_eq!(follower.load(Ordering::SeqCst), 1);
        // the lease was really taken before the leader failed
        assert_eq!(service.owner("migrate").as_deref(), Some("a"));
        assert!(!election.locker().is_held());
        assert!(logs_contain("leader work failed"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_leader_among_three() {
        let service = MemoryLockService::new(Duration::from_secs(3));
        let leader = Arc::new(AtomicUsize::new(0));
        let follower = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let mut tasks = Vec::new();
        for id in 0..3 {
            let lock = Lock::new(
                "fake-lock",
                Duration::from_secs(1),
                service.channel(format!("client{id}")),
            );
            let leader = leader.clone();
            let leader_work = work_fn(move |_token| {
                let leader = leader.clone();
                async move {
                    leader.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            });
            let election = Election::new(lock, leader_work, counting(&follower, false))
                .with_policy(RetryPolicy::ONCE);
            let token = token.clone();
            tasks.push(tokio::spawn(async move { election.run(&token).await }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(leader.load(Ordering::SeqCst), 1);
        assert_eq!(follower.load(Ordering::SeqCst), 2);
    }
}
