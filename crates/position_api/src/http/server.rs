use crate::http::build_router;
use anyhow::{Context, Result};
use common::domain::PositionQueryRepository;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct HttpServerConfig {
    pub address: SocketAddr,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            address: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Serves the vehicle position query API until cancelled
pub struct PositionApi {
    repository: Arc<dyn PositionQueryRepository>,
    config: HttpServerConfig,
}

impl PositionApi {
    pub fn new(repository: Arc<dyn PositionQueryRepository>, config: HttpServerConfig) -> Self {
        Self { repository, config }
    }

    /// Bind the configured address and serve
    pub async fn run(self, ctx: CancellationToken) -> Result<()> {
        let listener = TcpListener::bind(self.config.address)
            .await
            .with_context(|| format!("Failed to bind position API on {}", self.config.address))?;
        self.serve(listener, ctx).await
    }

    /// Serve on an already bound listener; in-flight requests finish after cancellation
    pub async fn serve(self, listener: TcpListener, ctx: CancellationToken) -> Result<()> {
        let address = listener.local_addr()?;
        info!(%address, "position API listening");

        axum::serve(listener, build_router(self.repository))
            .with_graceful_shutdown(async move {
                ctx.cancelled().await;
                info!("position API shutdown signal received");
            })
            .await
            .context("Position API server failed")?;

        info!("position API stopped");
        Ok(())
    }
}
