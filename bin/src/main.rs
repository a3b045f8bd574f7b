#![allow(clippy::cognitive_complexity)]
use std::time::Duration;

use anyhow::{Context, Result, anyhow};

mod lease_watch;
mod metrics_api;

use leasehold_core::{
    Election, Lock, LockError,
    config::{
        cli::{self, Command, Parser},
        trace,
    },
    tokio_util::sync::CancellationToken,
    tracing::*,
    work_fn,
};
use lease_watch::spawn_lease_watch;
use metrics_api::MetricsApi;
use tokio::{runtime::Builder, signal};

#[cfg(not(target_env = "musl"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "musl"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<()> {
    // load .env before clap reads the environment
    let dotenv = dotenv::dotenv();
    // parses from cli or environment var
    let config = cli::Config::parse();
    trace::init(&config.leasehold_log, config.log_format)?;
    debug!(?config);
    if let Err(err) = dotenv {
        debug!(?err, ".env file not loaded");
    }

    let mut builder = Builder::new_multi_thread();
    // configure thread name & enable IO/time
    builder.thread_name(&config.thread_name).enable_all();
    // default num threads will be num logical CPUs
    // if we have a configured value here, set it
    if let Some(num) = config.threads {
        builder.worker_threads(num);
    }
    // build the runtime
    let rt = builder.build()?;

    rt.block_on(async move {
        match tokio::spawn(async move { start(config).await }).await {
            Err(err) => error!(?err, "failed to start"),
            Ok(Err(err)) => error!(?err, "exited with error"),
            Ok(_) => debug!("exiting..."),
        }
    });

    Ok(())
}

async fn start(config: cli::Config) -> Result<()> {
    let token = CancellationToken::new();
    let signal_task = tokio::spawn(shutdown_signal(token.clone()));

    // stopped only after the lock is released
    let metrics_token = CancellationToken::new();
    let metrics_server = match config.metrics_addr {
        Some(addr) => Some(
            MetricsApi::bind(addr)
                .await
                .with_context(|| format!("failed to bind metrics address {addr}"))?
                .serve(metrics_token.clone()),
        ),
        None => None,
    };

    let res = match config.command.clone() {
        Command::Lock { name, hold } => run_lock(&config, name, hold, token.clone()).await,
        Command::Elect { name, hold } => run_election(&config, name, hold, token.clone()).await,
    };

    signal_task.abort();
    metrics_token.cancel();
    if let Some(server) = metrics_server {
        if let Err(err) = server.await {
            error!(?err, "error waiting for metrics server");
        }
    }
    res
}

fn new_lock(config: &cli::Config, name: String) -> Result<Lock> {
    info!(lock = %name, base_url = %config.base_url, interval = ?config.interval(), "creating lock");
    Lock::with_http(
        name,
        config.base_url.clone(),
        config.interval(),
        config.request_timeout(),
    )
    .context("failed to create lock client")
}

/// Take the lock and hold it until `hold` elapses or shutdown.
async fn run_lock(
    config: &cli::Config,
    name: String,
    hold: Option<u64>,
    token: CancellationToken,
) -> Result<()> {
    let lock = new_lock(config, name.clone())?;
    let watch = spawn_lease_watch(name, lock.subscribe(), token.clone());

    let res = lock
        .acquire(&token, config.retries, |work_token| async move {
            info!("got the lock");
            hold_until(work_token, hold).await;
            Ok(())
        })
        .await;

    token.cancel();
    if let Err(err) = watch.await {
        error!(?err, "error waiting for lease watch task");
    }

    match res {
        Ok(()) => Ok(()),
        Err(LockError::Cancelled) => {
            info!("shutdown before the lock was acquired");
            Ok(())
        }
        Err(err) => Err(err).context("lock failed"),
    }
}

/// Run one election round, leading for `hold` or until shutdown.
async fn run_election(
    config: &cli::Config,
    name: String,
    hold: Option<u64>,
    token: CancellationToken,
) -> Result<()> {
    let lock = new_lock(config, name.clone())?;
    let watch = spawn_lease_watch(name, lock.subscribe(), token.clone());

    let leader = work_fn(move |token| async move {
        info!("LEADER");
        hold_until(token, hold).await;
        Ok(())
    });
    let follower = work_fn(|_token| async {
        info!("FOLLOWER");
        Ok(())
    });
    let election = Election::new(lock, leader, follower).with_policy(config.retries);

    let res = election.run(&token).await;

    token.cancel();
    if let Err(err) = watch.await {
        error!(?err, "error waiting for lease watch task");
    }
    res.context("election failed")
}

async fn hold_until(token: CancellationToken, hold: Option<u64>) {
    match hold {
        Some(secs) => {
            tokio::select! {
                _ = token.cancelled() => info!("work cancelled"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("work complete"),
            }
        }
        None => {
            token.cancelled().await;
            info!("work cancelled");
        }
    }
}

async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ret = signal::ctrl_c().await.map_err(|err| anyhow!(err));
    token.cancel();
    ret
}
