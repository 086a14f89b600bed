//! Warmup coordinator — drives one warmup epoch.
//!
//! ```text
//! Idle ──► AwaitingTopologyReady ──► Dispatching ──► Completed
//!   │               │
//!   └───────────────┴──► Cancelled
//! ```
//!
//! Each endpoint runs its own await-then-probe task, so endpoints are
//! warmed independently as soon as their own dependencies are ready.
//! All tasks live in one `JoinSet` owned by a supervisor task; dropping
//! or aborting the supervisor aborts every outstanding task.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use flowgate_core::{Endpoint, EndpointId, Topology, WarmupTargets, compute_warmup_targets};
use flowgate_readiness::{ReadinessTracker, WaitOutcome};

use crate::error::{WarmupError, WarmupResult};
use crate::probe::{ProbeOutcome, StatusProbe};
use crate::report::{EndpointOutcome, SkipReason, WarmupReport};

/// Phase of a warmup epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPhase {
    Idle,
    AwaitingTopologyReady,
    Dispatching,
    Completed,
    Cancelled,
}

impl WarmupPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, WarmupPhase::Completed | WarmupPhase::Cancelled)
    }
}

/// State shared by the supervisor and every endpoint task.
struct Shared {
    tracker: ReadinessTracker,
    probe: Arc<dyn StatusProbe>,
    phase: watch::Sender<WarmupPhase>,
    /// Endpoints a probe has been dispatched to in this epoch.
    dispatched: Mutex<HashSet<EndpointId>>,
    report: Mutex<WarmupReport>,
}

impl Shared {
    /// Claim the right to probe an endpoint. True exactly once per id.
    fn claim(&self, id: &EndpointId) -> bool {
        let mut dispatched = self.dispatched.lock().expect("dispatched lock");
        dispatched.insert(id.clone())
    }

    fn record(&self, id: EndpointId, outcome: EndpointOutcome) {
        let mut report = self.report.lock().expect("report lock");
        report.record(id, outcome);
    }

    fn advance(&self, from: WarmupPhase, to: WarmupPhase) {
        self.phase.send_if_modified(|phase| {
            if *phase == from {
                *phase = to;
                true
            } else {
                false
            }
        });
    }
}

/// Coordinates warmup of every registry-derived endpoint of a topology.
///
/// One coordinator serves one activation epoch, however many protocol
/// front-ends the gateway binds.
pub struct WarmupCoordinator {
    targets: Arc<WarmupTargets>,
    deadline: Option<Duration>,
    shared: Arc<Shared>,
}

impl WarmupCoordinator {
    /// Build a coordinator. Fails if the topology is malformed.
    pub fn new(
        topology: &Topology,
        tracker: ReadinessTracker,
        probe: Arc<dyn StatusProbe>,
    ) -> WarmupResult<Self> {
        let targets = compute_warmup_targets(topology)?;
        let (phase, _) = watch::channel(WarmupPhase::Idle);
        Ok(Self {
            targets: Arc::new(targets),
            deadline: None,
            shared: Arc::new(Shared {
                tracker,
                probe,
                phase,
                dispatched: Mutex::new(HashSet::new()),
                report: Mutex::new(WarmupReport::default()),
            }),
        })
    }

    /// Give up on endpoints whose dependencies are not ready within
    /// `deadline` of activation.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn targets(&self) -> &WarmupTargets {
        &self.targets
    }

    pub fn phase(&self) -> WarmupPhase {
        *self.shared.phase.borrow()
    }

    /// Start warming. `cancel` is the gateway's shutdown signal.
    pub fn activate(&self, cancel: watch::Receiver<bool>) -> WarmupResult<WarmupHandle> {
        let activated = self.shared.phase.send_if_modified(|phase| {
            if *phase == WarmupPhase::Idle {
                *phase = WarmupPhase::AwaitingTopologyReady;
                true
            } else {
                false
            }
        });
        if !activated {
            return Err(WarmupError::AlreadyActivated);
        }

        info!(targets = self.targets.len(), "warmup activated");

        let deadline = self.deadline.map(|d| Instant::now() + d);
        let supervisor = tokio::spawn(supervise(
            self.shared.clone(),
            self.targets.clone(),
            deadline,
            cancel,
        ));

        Ok(WarmupHandle {
            supervisor: Some(supervisor),
            shared: self.shared.clone(),
            targets: self.targets.clone(),
            phase: self.shared.phase.subscribe(),
        })
    }
}

/// Handle to an activated warmup epoch.
///
/// Dropping the handle without `join` aborts every outstanding wait and
/// probe.
pub struct WarmupHandle {
    supervisor: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    targets: Arc<WarmupTargets>,
    phase: watch::Receiver<WarmupPhase>,
}

impl WarmupHandle {
    pub fn phase(&self) -> WarmupPhase {
        *self.phase.borrow()
    }

    /// Wait until the epoch reaches `Completed` or `Cancelled`.
    pub async fn settled(&mut self) -> WarmupPhase {
        if let Ok(phase) = self.phase.wait_for(|phase| phase.is_terminal()).await {
            return *phase;
        }
        *self.phase.borrow()
    }

    /// Abort every outstanding wait and probe.
    pub fn abort(&self) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.abort();
        }
    }

    /// Wait for every endpoint task and return the epoch's report.
    ///
    /// Endpoints left without an outcome (after `abort`) are reported as
    /// cancelled.
    pub async fn join(mut self) -> WarmupReport {
        if let Some(supervisor) = self.supervisor.take() {
            if let Err(e) = supervisor.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "warmup supervisor failed");
                }
                self.shared.advance(WarmupPhase::AwaitingTopologyReady, WarmupPhase::Cancelled);
                self.shared.advance(WarmupPhase::Dispatching, WarmupPhase::Completed);
            }
        }

        let mut report = self.shared.report.lock().expect("report lock").clone();
        report.fill_cancelled(self.targets.ids());
        report
    }
}

impl Drop for WarmupHandle {
    fn drop(&mut self) {
        if let Some(supervisor) = self.supervisor.take() {
            debug!("warmup handle dropped, aborting outstanding endpoints");
            supervisor.abort();
        }
    }
}

async fn supervise(
    shared: Arc<Shared>,
    targets: Arc<WarmupTargets>,
    deadline: Option<Instant>,
    cancel: watch::Receiver<bool>,
) {
    let mut tasks = JoinSet::new();
    for endpoint in targets.iter().cloned() {
        tasks.spawn(warm_endpoint(shared.clone(), endpoint, deadline, cancel.clone()));
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "warmup task failed");
        }
    }

    let cancelled = *cancel.borrow();
    if cancelled {
        shared.advance(WarmupPhase::AwaitingTopologyReady, WarmupPhase::Cancelled);
    }
    shared.advance(WarmupPhase::AwaitingTopologyReady, WarmupPhase::Completed);
    shared.advance(WarmupPhase::Dispatching, WarmupPhase::Completed);

    let report = shared.report.lock().expect("report lock").clone();
    info!(
        probed = report.probed(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        skipped = report.skipped(),
        cancelled,
        "warmup finished"
    );
}

async fn warm_endpoint(
    shared: Arc<Shared>,
    endpoint: Endpoint,
    deadline: Option<Instant>,
    mut cancel: watch::Receiver<bool>,
) {
    let id = endpoint.id.clone();

    for dependency in &endpoint.dependencies {
        let wait = shared.tracker.await_ready(dependency, &mut cancel);
        let outcome = match deadline {
            Some(at) => match tokio::time::timeout_at(at, wait).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(endpoint = %id, component = %dependency, "readiness deadline expired, endpoint not warmed");
                    shared.record(id, EndpointOutcome::Skipped(SkipReason::ReadinessTimeout));
                    return;
                }
            },
            None => wait.await,
        };

        match outcome {
            WaitOutcome::Ready => {}
            WaitOutcome::Cancelled => {
                debug!(endpoint = %id, "warmup skipped, shutting down");
                shared.record(id, EndpointOutcome::Skipped(SkipReason::Cancelled));
                return;
            }
            WaitOutcome::Failed(reason) => {
                warn!(endpoint = %id, component = %dependency, %reason, "dependency failed, endpoint not warmed");
                shared.record(
                    id,
                    EndpointOutcome::Skipped(SkipReason::TargetFailed {
                        component: dependency.clone(),
                        reason,
                    }),
                );
                return;
            }
        }
    }

    if *cancel.borrow() {
        debug!(endpoint = %id, "warmup skipped, shutting down");
        shared.record(id, EndpointOutcome::Skipped(SkipReason::Cancelled));
        return;
    }

    if !shared.claim(&id) {
        debug!(endpoint = %id, "warmup probe already dispatched");
        return;
    }
    shared.advance(WarmupPhase::AwaitingTopologyReady, WarmupPhase::Dispatching);

    let outcome = shared.probe.probe(&endpoint).await;
    match &outcome {
        ProbeOutcome::Success => debug!(endpoint = %id, "warmup probe succeeded"),
        ProbeOutcome::TransportError(detail) => {
            warn!(endpoint = %id, %detail, "warmup probe failed")
        }
    }
    shared.record(id, EndpointOutcome::Probed(outcome));
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use flowgate_core::{ComponentId, Deployment, Edge, TopologyError};

    use super::*;

    /// Records every probe and checks that dependencies were ready first.
    struct RecordingProbe {
        tracker: ReadinessTracker,
        calls: Mutex<Vec<EndpointId>>,
        premature: Mutex<Vec<EndpointId>>,
        failing: HashSet<EndpointId>,
    }

    impl RecordingProbe {
        fn new(tracker: &ReadinessTracker) -> Arc<Self> {
            Self::failing(tracker, HashSet::new())
        }

        fn failing(tracker: &ReadinessTracker, failing: HashSet<EndpointId>) -> Arc<Self> {
            Arc::new(Self {
                tracker: tracker.clone(),
                calls: Mutex::new(Vec::new()),
                premature: Mutex::new(Vec::new()),
                failing,
            })
        }

        fn calls(&self) -> Vec<EndpointId> {
            self.calls.lock().unwrap().clone()
        }

        fn premature(&self) -> Vec<EndpointId> {
            self.premature.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusProbe for RecordingProbe {
        async fn probe(&self, endpoint: &Endpoint) -> ProbeOutcome {
            if !endpoint.dependencies.iter().all(|d| self.tracker.is_ready(d)) {
                self.premature.lock().unwrap().push(endpoint.id.clone());
            }
            self.calls.lock().unwrap().push(endpoint.id.clone());
            if self.failing.contains(&endpoint.id) {
                ProbeOutcome::TransportError("connection refused".to_string())
            } else {
                ProbeOutcome::Success
            }
        }
    }

    fn single() -> Topology {
        Topology::default().with(Deployment::new("executor", 1, 1))
    }

    fn sharded() -> Topology {
        Topology::default()
            .with(Deployment::new("executor0", 2, 1))
            .with(Deployment::new("executor1", 1, 2))
    }

    fn mark_all_ready(tracker: &ReadinessTracker, topology: &Topology) {
        for component in topology.components() {
            tracker.mark_ready(&component).unwrap();
        }
    }

    fn distinct(calls: &[EndpointId]) -> usize {
        calls.iter().collect::<HashSet<_>>().len()
    }

    #[tokio::test]
    async fn fast_deployment_is_probed_once() {
        let topology = single();
        let tracker = ReadinessTracker::new();
        mark_all_ready(&tracker, &topology);
        let probe = RecordingProbe::new(&tracker);

        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone()).unwrap();
        assert_eq!(coordinator.phase(), WarmupPhase::Idle);

        let (_tx, cancel) = watch::channel(false);
        let report = coordinator.activate(cancel).unwrap().join().await;

        assert_eq!(probe.calls().len(), 1);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(coordinator.phase(), WarmupPhase::Completed);
    }

    #[tokio::test]
    async fn shards_and_replicas_probe_five_endpoints_as_they_become_ready() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel).unwrap();
        assert_eq!(handle.phase(), WarmupPhase::AwaitingTopologyReady);

        for component in topology.components().into_iter().rev() {
            tokio::time::sleep(Duration::from_millis(5)).await;
            tracker.mark_starting(&component).unwrap();
            tracker.mark_ready(&component).unwrap();
        }

        let report = handle.join().await;
        let calls = probe.calls();
        assert_eq!(calls.len(), 5);
        assert_eq!(distinct(&calls), 5);
        assert_eq!(report.probed(), 5);
        assert!(probe.premature().is_empty());
    }

    #[tokio::test]
    async fn cancel_before_ready_issues_no_probes() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (tx, cancel) = watch::channel(false);
        let mut handle = coordinator.activate(cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.settled().await, WarmupPhase::Cancelled);
        let report = tokio::time::timeout(Duration::from_secs(1), handle.join())
            .await
            .expect("cancelled warmup joins promptly");

        // Readiness after teardown must not trigger anything.
        mark_all_ready(&tracker, &topology);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(probe.calls().is_empty());
        assert_eq!(report.skipped(), 5);
        assert!(
            report
                .iter()
                .all(|(_, o)| *o == EndpointOutcome::Skipped(SkipReason::Cancelled))
        );
    }

    #[tokio::test]
    async fn cancel_raised_before_activation_skips_everything() {
        let topology = single();
        let tracker = ReadinessTracker::new();
        mark_all_ready(&tracker, &topology);
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone()).unwrap();

        let (tx, cancel) = watch::channel(false);
        tx.send(true).unwrap();
        let report = coordinator.activate(cancel).unwrap().join().await;

        assert!(probe.calls().is_empty());
        assert_eq!(report.skipped(), 1);
        assert_eq!(coordinator.phase(), WarmupPhase::Cancelled);
    }

    #[tokio::test]
    async fn cancel_after_completion_adds_no_probes() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        mark_all_ready(&tracker, &topology);
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (tx, cancel) = watch::channel(false);
        let _gateway = cancel.clone();
        let mut handle = coordinator.activate(cancel).unwrap();
        assert_eq!(handle.settled().await, WarmupPhase::Completed);

        tx.send(true).unwrap();
        tracker.shutdown();
        let report = handle.join().await;

        assert_eq!(probe.calls().len(), 5);
        assert_eq!(report.probed(), 5);
        assert_eq!(coordinator.phase(), WarmupPhase::Completed);
    }

    #[tokio::test]
    async fn repeated_readiness_notifications_probe_once() {
        let topology = single();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel).unwrap();

        let replica = ComponentId::replica("executor", 0, 0);
        for _ in 0..5 {
            tracker.mark_ready(&replica).unwrap();
            tokio::task::yield_now().await;
        }

        handle.join().await;
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn partial_readiness_then_cancel_probes_only_ready_endpoints() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (tx, cancel) = watch::channel(false);
        let mut handle = coordinator.activate(cancel).unwrap();

        for replica in topology.get("executor1").unwrap().runtimes() {
            tracker.mark_ready(&replica).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();

        assert_eq!(handle.settled().await, WarmupPhase::Completed);
        let report = handle.join().await;

        let expected = Edge::GatewayToDeployment {
            deployment: "executor1".to_string(),
        }
        .id();
        assert_eq!(probe.calls(), vec![expected.clone()]);
        assert_eq!(
            report.outcome(&expected),
            Some(&EndpointOutcome::Probed(ProbeOutcome::Success))
        );
        assert_eq!(report.skipped(), 4);
    }

    #[tokio::test]
    async fn probe_failure_does_not_stop_other_endpoints() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        mark_all_ready(&tracker, &topology);

        let broken = Edge::HeadToShard {
            deployment: "executor0".to_string(),
            shard: 1,
        }
        .id();
        let probe = RecordingProbe::failing(&tracker, HashSet::from([broken.clone()]));
        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let report = coordinator.activate(cancel).unwrap().join().await;

        assert_eq!(probe.calls().len(), 5);
        assert_eq!(report.succeeded(), 4);
        assert_eq!(report.failed(), 1);
        assert!(matches!(
            report.outcome(&broken),
            Some(EndpointOutcome::Probed(ProbeOutcome::TransportError(_)))
        ));
        assert_eq!(coordinator.phase(), WarmupPhase::Completed);
    }

    #[tokio::test]
    async fn failed_dependency_skips_only_its_endpoints() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel).unwrap();

        let head = ComponentId::head("executor0");
        tracker.mark_failed(&head, "address in use").unwrap();
        for component in topology.components() {
            if component != head {
                tracker.mark_ready(&component).unwrap();
            }
        }

        let report = handle.join().await;
        // Both edges through the head are skipped; the head->shard edges
        // only need the shards.
        assert_eq!(report.probed(), 3);
        assert_eq!(report.skipped(), 2);
        let through_head = Edge::GatewayToDeployment {
            deployment: "executor0".to_string(),
        }
        .id();
        assert_eq!(
            report.outcome(&through_head),
            Some(&EndpointOutcome::Skipped(SkipReason::TargetFailed {
                component: head,
                reason: "address in use".to_string(),
            }))
        );
    }

    #[tokio::test]
    async fn readiness_deadline_skips_slow_endpoints() {
        let topology = single();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone())
            .unwrap()
            .with_deadline(Duration::from_millis(30));

        let (_tx, cancel) = watch::channel(false);
        let report = coordinator.activate(cancel).unwrap().join().await;

        assert!(probe.calls().is_empty());
        assert!(
            report
                .iter()
                .all(|(_, o)| *o == EndpointOutcome::Skipped(SkipReason::ReadinessTimeout))
        );
        assert_eq!(coordinator.phase(), WarmupPhase::Completed);
    }

    #[tokio::test]
    async fn abort_reports_outstanding_endpoints_as_cancelled() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        let report = handle.join().await;
        assert_eq!(report.skipped(), 5);
        assert!(probe.calls().is_empty());
        assert_eq!(coordinator.phase(), WarmupPhase::Cancelled);
    }

    #[tokio::test]
    async fn dropped_handle_stops_outstanding_endpoints() {
        let topology = sharded();
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker.clone(), probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(handle);
        drop(coordinator);
        tokio::time::sleep(Duration::from_millis(10)).await;

        mark_all_ready(&tracker, &topology);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(probe.calls().is_empty());
    }

    #[tokio::test]
    async fn activation_happens_once_per_epoch() {
        let topology = single();
        let tracker = ReadinessTracker::new();
        mark_all_ready(&tracker, &topology);
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&topology, tracker, probe.clone()).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let handle = coordinator.activate(cancel.clone()).unwrap();
        assert!(matches!(
            coordinator.activate(cancel),
            Err(WarmupError::AlreadyActivated)
        ));
        handle.join().await;
        assert_eq!(probe.calls().len(), 1);
    }

    #[tokio::test]
    async fn malformed_topology_is_a_configuration_error() {
        let topology = Topology::default().with(Deployment::new("executor0", 0, 1));
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);

        let err = WarmupCoordinator::new(&topology, tracker, probe)
            .err()
            .expect("zero shards must be rejected");
        assert!(matches!(
            err,
            WarmupError::Configuration(TopologyError::ZeroShards(_))
        ));
    }

    #[tokio::test]
    async fn empty_topology_completes_immediately() {
        let tracker = ReadinessTracker::new();
        let probe = RecordingProbe::new(&tracker);
        let coordinator = WarmupCoordinator::new(&Topology::default(), tracker, probe).unwrap();

        let (_tx, cancel) = watch::channel(false);
        let report = coordinator.activate(cancel).unwrap().join().await;
        assert!(report.is_empty());
        assert_eq!(coordinator.phase(), WarmupPhase::Completed);
    }
}
