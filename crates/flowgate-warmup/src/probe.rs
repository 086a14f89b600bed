//! Status probes — a single lightweight call to one warmup endpoint.
//!
//! The transport sits behind [`StatusProbe`]; [`HttpStatusProbe`] is the
//! HTTP/1 implementation used by the runtimes of a local flow.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use flowgate_core::Endpoint;

use crate::address::AddressBook;

/// Path of the status handler every runtime serves.
pub const STATUS_PATH: &str = "/_status";

/// Fixed timeout of a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Result of a single probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum ProbeOutcome {
    /// The status handler answered.
    Success,
    /// Connection, protocol, or status failure.
    TransportError(String),
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success)
    }
}

/// Issues one status call to an endpoint. Single attempt, no retry.
#[async_trait]
pub trait StatusProbe: Send + Sync {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome;
}

/// Probes `GET /_status` over HTTP/1.
///
/// Addressees are resolved through the [`AddressBook`]; when an endpoint
/// has several (replicas of one shard) they are picked round-robin.
pub struct HttpStatusProbe {
    addresses: AddressBook,
    counter: AtomicUsize,
    timeout: Duration,
}

impl HttpStatusProbe {
    pub fn new(addresses: AddressBook) -> Self {
        Self {
            addresses,
            counter: AtomicUsize::new(0),
            timeout: PROBE_TIMEOUT,
        }
    }

    fn pick_address(&self, endpoint: &Endpoint) -> Result<String, String> {
        if endpoint.addressees.is_empty() {
            return Err(format!("endpoint {} has no addressees", endpoint.id));
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % endpoint.addressees.len();
        let component = &endpoint.addressees[idx];
        self.addresses
            .resolve(component)
            .ok_or_else(|| format!("no address registered for {component}"))
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
        match self.pick_address(endpoint) {
            Ok(address) => http_status_probe(&address, STATUS_PATH, self.timeout).await,
            Err(detail) => ProbeOutcome::TransportError(detail),
        }
    }
}

/// Perform one HTTP status call against `address`.
///
/// Returns `Success` on 2xx, `TransportError` on anything else,
/// including connection failure and timeout.
pub async fn http_status_probe(address: &str, path: &str, timeout: Duration) -> ProbeOutcome {
    let uri = format!("http://{address}{path}");

    let result = tokio::time::timeout(timeout, async {
        let stream = tokio::net::TcpStream::connect(address)
            .await
            .map_err(|e| format!("connect failed: {e}"))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| format!("handshake failed: {e}"))?;

        // The connection task ends when the sender is dropped.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", address)
            .header("user-agent", "flowgate-warmup/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| format!("invalid request: {e}"))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        if resp.status().is_success() {
            Ok::<(), String>(())
        } else {
            Err(format!("status {}", resp.status()))
        }
    })
    .await;

    match result {
        Ok(Ok(())) => ProbeOutcome::Success,
        Ok(Err(detail)) => {
            debug!(%uri, %detail, "status probe failed");
            ProbeOutcome::TransportError(detail)
        }
        Err(_) => {
            debug!(%uri, "status probe timed out");
            ProbeOutcome::TransportError(format!("timed out after {timeout:?}"))
        }
    }
}
