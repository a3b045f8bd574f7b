//! HTTP lock channel talking to the lock sidecar.
//!
//! GET `<base>/locks/<name>` is the query, PUT is acquire-or-renew. Neither
//! carries a body.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use tracing::trace;

use crate::channel::{QueryStatus, RemoteLockChannel, RenewStatus, lock_url};
use crate::error::{LockError, LockResult};

/// Default sidecar address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `RemoteLockChannel` over HTTP.
#[derive(Debug, Clone)]
pub struct HttpLockChannel {
    client: Client,
    base_url: String,
}

impl HttpLockChannel {
    /// Create a channel for `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, request_timeout: Duration) -> LockResult<Self> {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| LockError::Transport(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Returns the configured base url.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(&self, method: Method, name: &str) -> LockResult<u16> {
        let url = lock_url(&self.base_url, name);
        let resp = self
            .client
            .request(method.clone(), &url)
            .send()
            .await
            .map_err(|e| LockError::Transport(format!("{method} {url} failed: {e}")))?;
        let status = resp.status().as_u16();
        trace!(%method, %url, status, "lock service responded");
        Ok(status)
    }
}

#[async_trait]
impl RemoteLockChannel for HttpLockChannel {
    async fn query(&self, name: &str) -> LockResult<QueryStatus> {
        QueryStatus::from_status(self.send(Method::GET, name).await?)
    }

    async fn acquire_or_renew(&self, name: &str) -> LockResult<RenewStatus> {
        RenewStatus::from_status(self.send(Method::PUT, name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_keeps_base_url() {
        let channel = HttpLockChannel::new(DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT).unwrap();
        assert_eq!(channel.base_url(), "http://localhost:8080");
    }

    #[tokio::test]
    async fn test_unreachable_service_is_transport_error() {
        // port 9 (discard) on loopback is not expected to be listening
        let channel =
            HttpLockChannel::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = channel.query("leader").await.unwrap_err();
        assert!(matches!(err, LockError::Transport(_)), "{err:?}");
    }
}
