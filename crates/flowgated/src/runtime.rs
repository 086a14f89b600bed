//! Local flow — every head and replica of a topology, run in-process.
//!
//! Each runtime follows its own startup routine and reports progress to
//! the readiness tracker itself:
//!
//! ```text
//! mark_starting → startup delay → bind → register address → mark_ready → serve
//! ```
//!
//! A shutdown during the startup delay abandons startup; a bind failure
//! marks the runtime failed.

use std::collections::HashMap;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use flowgate_core::{ComponentId, Deployment, Topology};
use flowgate_readiness::{ReadinessTracker, WaitOutcome};
use flowgate_warmup::AddressBook;

use crate::status::{StatusLog, runtime_router};

/// Handles to the runtimes of a running local flow.
pub struct LocalFlow {
    tasks: JoinSet<()>,
}

impl LocalFlow {
    /// Spawn every runtime of `topology`. Returns immediately; runtimes
    /// report readiness as they come up.
    pub fn start(
        topology: &Topology,
        host: &str,
        startup_delays: &HashMap<String, Duration>,
        tracker: &ReadinessTracker,
        addresses: &AddressBook,
        log: &StatusLog,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let mut tasks = JoinSet::new();

        for deployment in &topology.deployments {
            let delay = startup_delays
                .get(&deployment.name)
                .copied()
                .unwrap_or(Duration::ZERO);

            for component in deployment.runtimes() {
                // Heads route; only workers are slow to start.
                let delay = match &component {
                    ComponentId::Head { .. } => Duration::ZERO,
                    _ => delay,
                };
                tasks.spawn(run_runtime(
                    component,
                    host.to_string(),
                    delay,
                    tracker.clone(),
                    addresses.clone(),
                    log.clone(),
                    shutdown.clone(),
                ));
            }

            tasks.spawn(track_deployment(
                deployment.clone(),
                tracker.clone(),
                shutdown.clone(),
            ));
        }

        info!(
            deployments = topology.deployments.len(),
            runtimes = topology.components().len(),
            "local flow starting"
        );
        Self { tasks }
    }

    /// Wait for every runtime to stop. Call after raising shutdown.
    pub async fn join(mut self) {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "runtime task failed");
            }
        }
        debug!("local flow stopped");
    }
}

async fn run_runtime(
    component: ComponentId,
    host: String,
    delay: Duration,
    tracker: ReadinessTracker,
    addresses: AddressBook,
    log: StatusLog,
    shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = tracker.mark_starting(&component) {
        warn!(%component, error = %e, "runtime could not report startup");
        return;
    }

    if !delay.is_zero() {
        debug!(%component, ?delay, "runtime startup delayed");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_signal(shutdown.clone()) => {
                debug!(%component, "runtime startup abandoned");
                return;
            }
        }
    }

    let listener = match TcpListener::bind((host.as_str(), 0)).await {
        Ok(listener) => listener,
        Err(e) => {
            warn!(%component, error = %e, "runtime failed to bind");
            let _ = tracker.mark_failed(&component, &e.to_string());
            return;
        }
    };
    let address = match listener.local_addr() {
        Ok(addr) => addr.to_string(),
        Err(e) => {
            let _ = tracker.mark_failed(&component, &e.to_string());
            return;
        }
    };

    addresses.register(&component, &address);
    if tracker.mark_ready(&component).is_err() {
        return;
    }
    info!(%component, %address, "runtime ready");

    let router = runtime_router(component.clone(), log);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;
    if let Err(e) = served {
        warn!(%component, error = %e, "runtime server error");
    }

    debug!(%component, "runtime stopped");
}

/// Mark a deployment ready once all of its runtimes are.
async fn track_deployment(
    deployment: Deployment,
    tracker: ReadinessTracker,
    mut shutdown: watch::Receiver<bool>,
) {
    let id = ComponentId::deployment(&deployment.name);
    let _ = tracker.mark_starting(&id);

    for runtime in deployment.runtimes() {
        match tracker.await_ready(&runtime, &mut shutdown).await {
            WaitOutcome::Ready => {}
            WaitOutcome::Cancelled => return,
            WaitOutcome::Failed(reason) => {
                let _ = tracker.mark_failed(&id, &format!("{runtime}: {reason}"));
                return;
            }
        }
    }

    if tracker.mark_ready(&id).is_ok() {
        info!(deployment = %deployment.name, "deployment ready");
    }
}

/// Resolves once shutdown is raised. A dropped sender counts as shutdown.
pub(crate) async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|raised| *raised).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowgate_readiness::ReadinessState;

    #[tokio::test]
    async fn runtimes_register_and_become_ready() {
        let topology = Topology::default().with(Deployment::new("executor0", 2, 1));
        let tracker = ReadinessTracker::new();
        let addresses = AddressBook::new();
        let (tx, rx) = watch::channel(false);

        let flow = LocalFlow::start(
            &topology,
            "127.0.0.1",
            &HashMap::new(),
            &tracker,
            &addresses,
            &StatusLog::new(),
            rx.clone(),
        );

        let mut cancel = rx.clone();
        let outcome = tokio::time::timeout(
            Duration::from_secs(5),
            tracker.await_ready(&ComponentId::deployment("executor0"), &mut cancel),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WaitOutcome::Ready);
        assert_eq!(addresses.len(), 3);

        tx.send(true).unwrap();
        flow.join().await;
    }

    #[tokio::test]
    async fn shutdown_during_startup_delay_abandons_runtime() {
        let topology = Topology::default().with(Deployment::new("slow", 1, 1));
        let tracker = ReadinessTracker::new();
        let addresses = AddressBook::new();
        let (tx, rx) = watch::channel(false);
        let delays = HashMap::from([("slow".to_string(), Duration::from_secs(30))]);

        let flow = LocalFlow::start(
            &topology,
            "127.0.0.1",
            &delays,
            &tracker,
            &addresses,
            &StatusLog::new(),
            rx,
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        let replica = ComponentId::replica("slow", 0, 0);
        assert_eq!(tracker.state(&replica), ReadinessState::Starting);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), flow.join())
            .await
            .expect("slow runtime stops promptly");
        assert!(addresses.is_empty());
    }
}
