//! Lock client metrics.
//!
//! Metrics are lazily initialized on first access via `lazy_static!` and
//! registered in the default prometheus registry. Registration failures are
//! fatal: a duplicate metric name is a programming error.
//!
//! Nothing here serves them. The `leasehold` binary exposes them with
//! `--metrics-addr`; embedders call `prometheus::gather()`.

use lazy_static::lazy_static;
use prometheus::{IntCounter, IntGauge, register_int_counter, register_int_gauge};

lazy_static! {
    /// Count of acquire-or-renew calls made while acquiring
    pub static ref LOCK_ACQUIRE_ATTEMPTS: IntCounter = register_int_counter!(
        "lock_acquire_attempts",
        "count of acquire-or-renew calls made during acquisition"
    ).unwrap();

    /// Count of acquisition attempts answered with a conflict
    pub static ref LOCK_ACQUIRE_CONFLICTS: IntCounter = register_int_counter!(
        "lock_acquire_conflicts",
        "count of acquisition attempts that found the lock held by another owner"
    ).unwrap();

    /// Count of successful acquisitions
    pub static ref LOCK_ACQUIRED: IntCounter = register_int_counter!(
        "lock_acquired",
        "count of successful lock acquisitions"
    ).unwrap();

    /// Count of acquisitions that gave up after the retry budget
    pub static ref LOCK_RETRIES_EXHAUSTED: IntCounter = register_int_counter!(
        "lock_retries_exhausted",
        "count of acquisitions that exhausted their retry budget"
    ).unwrap();

    /// Count of successful heartbeat renewals
    pub static ref LOCK_RENEWALS: IntCounter = register_int_counter!(
        "lock_renewals",
        "count of successful heartbeat lease renewals"
    ).unwrap();

    /// Count of leases lost while work was running
    pub static ref LOCK_LEASES_LOST: IntCounter = register_int_counter!(
        "lock_leases_lost",
        "count of leases lost to another owner or a failed renewal during work"
    ).unwrap();

    /// Gauge: locks currently held by this process
    pub static ref LOCKS_HELD: IntGauge = register_int_gauge!(
        "locks_held",
        "number of locks currently held by this process"
    ).unwrap();
}
