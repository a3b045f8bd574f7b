use leasehold_core::{LeaseState, tokio_util::sync::CancellationToken, tracing::*};
use tokio::{sync::watch, task::JoinHandle};

/// Log every lease transition of a lock until `token` is cancelled.
pub fn spawn_lease_watch(
    name: String,
    mut states: watch::Receiver<LeaseState>,
    token: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(lock = %name, "lease watch stopping");
                    return;
                }
                changed = states.changed() => {
                    if changed.is_err() {
                        debug!(lock = %name, "lock dropped, lease watch stopping");
                        return;
                    }
                    let state = *states.borrow_and_update();
                    match state {
                        LeaseState::Held => info!(lock = %name, "lease held"),
                        LeaseState::Released => info!(lock = %name, "lease released"),
                        LeaseState::Lost => warn!(lock = %name, "lease lost"),
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stops_when_lock_dropped() {
        let (tx, rx) = watch::channel(LeaseState::Released);
        let token = CancellationToken::new();
        let handle = spawn_lease_watch("leader".into(), rx, token.clone());

        tx.send_replace(LeaseState::Held);
        tokio::task::yield_now().await;
        tx.send_replace(LeaseState::Lost);
        tokio::task::yield_now().await;
        drop(tx);
        handle.await.unwrap();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let (_tx, rx) = watch::channel(LeaseState::Released);
        let token = CancellationToken::new();
        let handle = spawn_lease_watch("leader".into(), rx, token.clone());
        token.cancel();
        handle.await.unwrap();
    }
}
