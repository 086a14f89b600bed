//! Status handlers served by every runtime and by the gateway.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use tracing::{debug, info};

use flowgate_core::{ComponentId, Protocol};
use flowgate_warmup::STATUS_PATH;

/// Counts status requests received per runtime component.
#[derive(Clone, Default)]
pub struct StatusLog {
    received: Arc<Mutex<HashMap<ComponentId, u64>>>,
}

impl StatusLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, component: &ComponentId) {
        let mut received = self.received.lock().expect("status log lock");
        *received.entry(component.clone()).or_insert(0) += 1;
    }

    /// Status requests received by one component.
    pub fn received(&self, component: &ComponentId) -> u64 {
        let received = self.received.lock().expect("status log lock");
        received.get(component).copied().unwrap_or(0)
    }

    /// Status requests received across all runtimes.
    pub fn total(&self) -> u64 {
        let received = self.received.lock().expect("status log lock");
        received.values().sum()
    }

    /// Status requests received by the runtimes of one deployment.
    pub fn deployment_total(&self, deployment: &str) -> u64 {
        let received = self.received.lock().expect("status log lock");
        received
            .iter()
            .filter(|(id, _)| match id {
                ComponentId::Head { deployment: d } | ComponentId::Replica { deployment: d, .. } => {
                    d == deployment
                }
                _ => false,
            })
            .map(|(_, n)| n)
            .sum()
    }
}

#[derive(Clone)]
struct RuntimeStatus {
    component: ComponentId,
    log: StatusLog,
}

/// Router for a head or replica runtime.
pub fn runtime_router(component: ComponentId, log: StatusLog) -> Router {
    Router::new()
        .route(STATUS_PATH, get(runtime_status))
        .with_state(RuntimeStatus { component, log })
}

async fn runtime_status(State(state): State<RuntimeStatus>) -> Json<Value> {
    info!(component = %state.component, "recv _status");
    state.log.record(&state.component);
    Json(json!({
        "component": state.component.to_string(),
        "status": "ready",
    }))
}

/// Router for one gateway protocol front-end.
pub fn gateway_router(protocol: Protocol) -> Router {
    Router::new()
        .route(STATUS_PATH, get(gateway_status))
        .with_state(protocol)
}

async fn gateway_status(State(protocol): State<Protocol>) -> Json<Value> {
    debug!(%protocol, "gateway status requested");
    Json(json!({
        "component": ComponentId::Gateway.to_string(),
        "protocol": protocol.as_str(),
        "status": "ready",
    }))
}
