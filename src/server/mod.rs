//! Shunt server: accept loop around the probe dispatcher.
//!
//! Binds the configured listener and spawns one task per accepted
//! connection. The probe chain is built once from configuration and shared
//! read-only by every connection task.

mod dispatcher;

pub use dispatcher::ReplayStream;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::config::ShuntConfig;
use crate::error::{NetworkError, Result};
use crate::probe::arbiter::ProbeChain;

/// A single-port protocol demultiplexer bound to one listener.
pub struct ShuntServer {
    config: ShuntConfig,
    chain: Arc<ProbeChain>,
}

impl ShuntServer {
    /// Creates a server from a validated configuration, binding every
    /// protocol entry to its probe.
    pub fn new(config: ShuntConfig) -> Result<Self> {
        let chain = Arc::new(config.build_chain()?);
        Ok(Self { config, chain })
    }

    /// The bound probe chain, in configuration order.
    pub fn chain(&self) -> &ProbeChain {
        &self.chain
    }

    /// Binds the configured listener and accepts connections until the
    /// task is cancelled.
    pub async fn run(&self) -> Result<()> {
        let address = SocketAddr::new(self.config.listen.address, self.config.listen.port);
        let listener = TcpListener::bind(address).await.map_err(|e| {
            warn!("Failed to bind {}: {}", address, e);
            NetworkError::BindFailed {
                address: address.to_string(),
            }
        })?;
        self.serve(listener).await
    }

    /// Accepts connections on an already-bound listener.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let probe_timeout = Duration::from_secs(self.config.timeout_s);

        if let Ok(address) = listener.local_addr() {
            info!(
                %address,
                protocols = self.chain.entries().len(),
                "listening"
            );
        }

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    continue;
                }
            };
            debug!(%peer, "accepted connection");

            let chain = self.chain.clone();
            tokio::spawn(async move {
                if let Err(e) = dispatcher::dispatch(&chain, stream, probe_timeout).await {
                    debug!(%peer, "connection failed: {}", e);
                }
            });
        }
    }
}
