//! Gateway front-ends — one listener per protocol binding.
//!
//! Every binding shares the same topology and the same warmup epoch;
//! binding more protocols only adds listeners. Request decoding for each
//! protocol lives behind these listeners and is not part of this crate.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};

use flowgate_core::{ComponentId, Protocol, ProtocolBinding};
use flowgate_readiness::ReadinessTracker;

use crate::runtime::shutdown_signal;
use crate::status::gateway_router;

/// The gateway's bound listeners.
pub struct Gateway {
    addresses: Vec<(Protocol, SocketAddr)>,
    servers: JoinSet<()>,
}

impl Gateway {
    /// Bind every protocol listener, then report the gateway ready.
    ///
    /// Fails (and marks the gateway failed) if any listener cannot bind.
    pub async fn start(
        host: &str,
        bindings: &[ProtocolBinding],
        tracker: &ReadinessTracker,
        shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<Self> {
        tracker.mark_starting(&ComponentId::Gateway)?;

        let mut listeners = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let bound = TcpListener::bind((host, binding.port))
                .await
                .and_then(|l| l.local_addr().map(|addr| (l, addr)));
            match bound {
                Ok((listener, addr)) => listeners.push((binding.protocol, listener, addr)),
                Err(e) => {
                    let reason = format!("{} listener on port {}: {e}", binding.protocol, binding.port);
                    let _ = tracker.mark_failed(&ComponentId::Gateway, &reason);
                    return Err(e).with_context(|| reason);
                }
            }
        }

        let mut servers = JoinSet::new();
        let mut addresses = Vec::with_capacity(listeners.len());
        for (protocol, listener, addr) in listeners {
            info!(%protocol, %addr, "gateway listener bound");
            addresses.push((protocol, addr));

            let signal = shutdown_signal(shutdown.clone());
            servers.spawn(async move {
                let served = axum::serve(listener, gateway_router(protocol))
                    .with_graceful_shutdown(signal)
                    .await;
                if let Err(e) = served {
                    warn!(%protocol, error = %e, "gateway listener error");
                }
            });
        }

        tracker.mark_ready(&ComponentId::Gateway)?;
        info!(bindings = addresses.len(), "gateway ready");
        Ok(Self { addresses, servers })
    }

    /// Bound address of every protocol front-end, in binding order.
    pub fn addresses(&self) -> &[(Protocol, SocketAddr)] {
        &self.addresses
    }

    /// Wait for every listener to stop. Call after raising shutdown.
    pub async fn join(mut self) {
        while let Some(joined) = self.servers.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "gateway listener task failed");
            }
        }
        info!("gateway stopped");
    }
}
