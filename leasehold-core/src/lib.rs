//! # leasehold
//!
//! Client side of a distributed lock with lease renewal, and a
//! leader/follower election built on it.
//!
//! A [`Lock`] asks an external lock service for a named resource, retries
//! conflicts according to a [`RetryPolicy`], and once acquired runs the
//! caller's work while a heartbeat renews the lease. An [`Election`] runs
//! leader work when it gets the lock and follower work otherwise.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use leasehold_core::{Lock, RetryPolicy, tokio_util::sync::CancellationToken};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let lock = Lock::with_http(
//!     "db-migration",
//!     "http://localhost:8080",
//!     Duration::from_secs(10),
//!     Duration::from_secs(10),
//! )?;
//! let token = CancellationToken::new();
//! lock.acquire(&token, RetryPolicy::Unlimited, |token| async move {
//!     // long running work, stop early if `token` is cancelled
//!     let _ = token;
//!     Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub,
    non_snake_case,
    non_upper_case_globals
)]
#![allow(clippy::cognitive_complexity)]
#![deny(rustdoc::broken_intra_doc_links)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_variables))
))]
pub use anyhow;
pub use async_trait::async_trait;
pub use tokio;
pub use tokio_util;
pub use tracing;

pub use crate::{
    channel::{QueryStatus, RemoteLockChannel, RenewStatus},
    election::{Election, Locker},
    error::{LockError, LockResult, Verb},
    http::HttpLockChannel,
    lock::{LeaseState, Lock},
    memory::{MemoryLockChannel, MemoryLockService},
    retry::RetryPolicy,
    work::{WorkFn, work_fn},
};

pub mod channel;
pub mod config;
pub mod election;
pub mod error;
pub mod http;
pub mod lock;
pub mod memory;
pub mod metrics;
pub mod retry;
pub mod work;
