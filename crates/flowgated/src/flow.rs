//! Flow lifecycle — starts runtimes and gateway, activates warmup, and
//! tears everything down in order.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use flowgate_core::{
    ComponentId, ConfigError, FlowConfig, Protocol, ProtocolBinding, Topology, WarmupTargets,
};
use flowgate_readiness::{ReadinessState, ReadinessTracker, WaitOutcome};
use flowgate_warmup::{
    AddressBook, HttpStatusProbe, WarmupCoordinator, WarmupHandle, WarmupPhase, WarmupReport,
};

use crate::gateway::Gateway;
use crate::runtime::LocalFlow;
use crate::status::StatusLog;

/// Everything needed to start a flow.
#[derive(Debug, Clone)]
pub struct FlowOptions {
    pub topology: Topology,
    pub host: String,
    pub bindings: Vec<ProtocolBinding>,
    pub startup_delays: HashMap<String, Duration>,
    pub warmup_deadline: Option<Duration>,
}

impl FlowOptions {
    /// A flow on loopback with one ephemeral gRPC front-end.
    pub fn new(topology: Topology) -> Self {
        Self {
            topology,
            host: "127.0.0.1".to_string(),
            bindings: vec![ProtocolBinding::new(Protocol::Grpc, 0)],
            startup_delays: HashMap::new(),
            warmup_deadline: None,
        }
    }

    pub fn from_config(config: &FlowConfig) -> Result<Self, ConfigError> {
        let topology = config.topology()?;
        let mut startup_delays = HashMap::new();
        for deployment in &topology.deployments {
            let delay = config.startup_delay(&deployment.name)?;
            if !delay.is_zero() {
                startup_delays.insert(deployment.name.clone(), delay);
            }
        }

        Ok(Self {
            host: config.gateway.host.clone(),
            bindings: config.bindings()?,
            warmup_deadline: config.warmup_deadline()?,
            startup_delays,
            topology,
        })
    }

    /// Replace the gateway front-ends with ephemeral ports for `protocols`.
    pub fn with_protocols(mut self, protocols: &[Protocol]) -> Self {
        self.bindings = protocols
            .iter()
            .map(|p| ProtocolBinding::new(*p, 0))
            .collect();
        self
    }

    pub fn with_startup_delay(mut self, deployment: &str, delay: Duration) -> Self {
        self.startup_delays.insert(deployment.to_string(), delay);
        self
    }

    pub fn with_warmup_deadline(mut self, deadline: Duration) -> Self {
        self.warmup_deadline = Some(deadline);
        self
    }
}

/// A running flow.
pub struct Flow {
    topology: Topology,
    targets: WarmupTargets,
    tracker: ReadinessTracker,
    status: StatusLog,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    runtimes: LocalFlow,
    gateway: Gateway,
    warmup: WarmupHandle,
}

impl Flow {
    /// Start a flow. A malformed topology or a gateway bind failure
    /// aborts startup; warmup problems never do.
    pub async fn start(options: FlowOptions) -> anyhow::Result<Self> {
        let tracker = ReadinessTracker::new();
        let addresses = AddressBook::new();
        let status = StatusLog::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let probe = Arc::new(HttpStatusProbe::new(addresses.clone()));
        let mut coordinator = WarmupCoordinator::new(&options.topology, tracker.clone(), probe)?;
        if let Some(deadline) = options.warmup_deadline {
            coordinator = coordinator.with_deadline(deadline);
        }
        let targets = coordinator.targets().clone();

        let runtimes = LocalFlow::start(
            &options.topology,
            &options.host,
            &options.startup_delays,
            &tracker,
            &addresses,
            &status,
            shutdown_rx.clone(),
        );

        let gateway = match Gateway::start(
            &options.host,
            &options.bindings,
            &tracker,
            shutdown_rx.clone(),
        )
        .await
        {
            Ok(gateway) => gateway,
            Err(e) => {
                let _ = shutdown_tx.send(true);
                tracker.shutdown();
                runtimes.join().await;
                return Err(e);
            }
        };

        let warmup = coordinator.activate(shutdown_rx.clone())?;
        info!(
            deployments = options.topology.deployments.len(),
            bindings = gateway.addresses().len(),
            targets = targets.len(),
            "flow started"
        );

        Ok(Self {
            topology: options.topology,
            targets,
            tracker,
            status,
            shutdown_tx,
            shutdown_rx,
            runtimes,
            gateway,
            warmup,
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn warmup_targets(&self) -> &WarmupTargets {
        &self.targets
    }

    pub fn status_log(&self) -> &StatusLog {
        &self.status
    }

    pub fn readiness(&self) -> &ReadinessTracker {
        &self.tracker
    }

    pub fn gateway_addresses(&self) -> &[(Protocol, SocketAddr)] {
        self.gateway.addresses()
    }

    pub fn warmup_phase(&self) -> WarmupPhase {
        self.warmup.phase()
    }

    /// Wait until warmup has completed or been cancelled.
    pub async fn warmup_settled(&mut self) -> WarmupPhase {
        self.warmup.settled().await
    }

    /// Wait until every deployment is ready. False if shutdown or a
    /// failed deployment came first.
    pub async fn wait_ready(&self) -> bool {
        let mut cancel = self.shutdown_rx.clone();
        for deployment in &self.topology.deployments {
            let id = ComponentId::deployment(&deployment.name);
            if self.tracker.await_ready(&id, &mut cancel).await != WaitOutcome::Ready {
                return false;
            }
        }
        true
    }

    /// Components that have reported in but are not ready.
    pub fn unready_components(&self) -> Vec<(ComponentId, ReadinessState)> {
        self.tracker
            .snapshot()
            .into_iter()
            .filter(|(_, state)| *state != ReadinessState::Ready)
            .collect()
    }

    /// Stop the flow and return what warmup achieved.
    pub async fn shutdown(self) -> WarmupReport {
        let unready: Vec<String> = self
            .unready_components()
            .into_iter()
            .map(|(id, state)| format!("{id}={}", state.as_str()))
            .collect();
        info!(?unready, "flow shutting down");
        let _ = self.shutdown_tx.send(true);

        let report = self.warmup.join().await;
        self.gateway.join().await;
        self.tracker.shutdown();
        self.runtimes.join().await;

        info!(
            probed = report.probed(),
            skipped = report.skipped(),
            "flow stopped"
        );
        report
    }
}
