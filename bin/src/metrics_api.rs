//! Prometheus text exposition for the lock client metrics.
use std::net::SocketAddr;

use anyhow::Result;
use axum::{
    Router,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing,
};
use leasehold_core::{tokio_util::sync::CancellationToken, tracing::*};
use prometheus::{Encoder, TextEncoder};
use tokio::{net::TcpListener, task::JoinHandle};

/// A bound, not yet serving, metrics listener
#[derive(Debug)]
pub struct MetricsApi {
    listener: TcpListener,
}

impl MetricsApi {
    /// Bind to `addr`. Port 0 picks a free port.
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve `/metrics` and `/health` until `token` is cancelled.
    pub fn serve(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let app = Router::new()
                .route("/health", routing::get(health))
                .route("/metrics", routing::get(metrics_text));
            if let Ok(addr) = self.listener.local_addr() {
                info!(%addr, "serving metrics");
            }
            if let Err(err) = axum::serve(self.listener, app)
                .with_graceful_shutdown(token.cancelled_owned())
                .await
            {
                error!(?err, "metrics server exited with error");
            }
        })
    }
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn metrics_text() -> Response {
    let encoder = TextEncoder::new();
    let mut buf = String::new();
    let mf = prometheus::gather();

    match encoder.encode_utf8(&mf, &mut buf) {
        Err(err) => {
            error!(?err, "error text encoding prometheus metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Ok(_) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_owned())],
            buf,
        )
            .into_response(),
    }
}
