//! TCP accept loop: one spawned session task per accepted connection.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::server::registry::Registry;
use crate::server::session;

pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    pub async fn bind(config: &ServerConfig) -> Result<Self, AppError> {
        let inner = TcpListener::bind(config.bind_addr()).await?;
        Ok(Self { inner })
    }

    /// The bound address; useful when the configured port is 0.
    pub fn local_addr(&self) -> Result<SocketAddr, AppError> {
        Ok(self.inner.local_addr()?)
    }

    /// Accept connections forever. A failed accept is logged and never fatal;
    /// each connection runs in its own task so per-connection failures stay
    /// contained there.
    pub async fn run(self, registry: Arc<Registry>) -> Result<(), AppError> {
        info!(addr = %self.local_addr()?, "listening for connections");
        loop {
            match self.inner.accept().await {
                Ok((stream, peer)) => {
                    info!(%peer, "accepted connection");
                    let registry = registry.clone();
                    tokio::spawn(async move {
                        session::run_connection(stream, registry).await;
                    });
                }
                Err(err) => {
                    warn!(error = %err, "failed to accept a connection");
                }
            }
        }
    }
}

pub async fn run_listener(config: &ServerConfig, registry: Arc<Registry>) -> Result<(), AppError> {
    Listener::bind(config).await?.run(registry).await
}
