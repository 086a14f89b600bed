//! Readiness tracker — a passive, shared table of component states.
//!
//! Every component gets a `watch` channel carrying its current state.
//! Transitions are applied under one mutex and pushed to all waiters at
//! once, so a wait never polls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use flowgate_core::ComponentId;

use crate::error::ReadinessError;

/// Startup state of one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessState {
    NotStarted,
    Starting,
    /// Accepting connections.
    Ready,
    Failed(String),
    /// Shut down; terminal.
    TornDown,
}

impl ReadinessState {
    /// Whether a waiter has nothing more to wait for.
    fn is_settled(&self) -> bool {
        matches!(
            self,
            ReadinessState::Ready | ReadinessState::Failed(_) | ReadinessState::TornDown
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessState::NotStarted => "not_started",
            ReadinessState::Starting => "starting",
            ReadinessState::Ready => "ready",
            ReadinessState::Failed(_) => "failed",
            ReadinessState::TornDown => "torn_down",
        }
    }
}

/// Result of waiting on a component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Ready,
    Cancelled,
    Failed(String),
}

#[derive(Default)]
struct Table {
    components: HashMap<ComponentId, watch::Sender<ReadinessState>>,
    torn_down: bool,
}

impl Table {
    fn channel(&mut self, id: &ComponentId) -> &watch::Sender<ReadinessState> {
        let initial = if self.torn_down {
            ReadinessState::TornDown
        } else {
            ReadinessState::NotStarted
        };
        self.components
            .entry(id.clone())
            .or_insert_with(|| watch::channel(initial).0)
    }
}

/// Shared readiness table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct ReadinessTracker {
    table: Arc<Mutex<Table>>,
}

impl ReadinessTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a component began its startup routine.
    pub fn mark_starting(&self, id: &ComponentId) -> Result<(), ReadinessError> {
        self.transition(id, ReadinessState::Starting)
    }

    /// Record that a component is accepting connections.
    pub fn mark_ready(&self, id: &ComponentId) -> Result<(), ReadinessError> {
        self.transition(id, ReadinessState::Ready)
    }

    /// Record that a component's startup failed.
    pub fn mark_failed(&self, id: &ComponentId, reason: &str) -> Result<(), ReadinessError> {
        self.transition(id, ReadinessState::Failed(reason.to_string()))
    }

    /// Current state of a component. Unknown components are `NotStarted`.
    pub fn state(&self, id: &ComponentId) -> ReadinessState {
        let table = self.table.lock().expect("readiness lock");
        match table.components.get(id) {
            Some(tx) => tx.borrow().clone(),
            None if table.torn_down => ReadinessState::TornDown,
            None => ReadinessState::NotStarted,
        }
    }

    pub fn is_ready(&self, id: &ComponentId) -> bool {
        self.state(id) == ReadinessState::Ready
    }

    /// States of every component that has reported at least once.
    pub fn snapshot(&self) -> Vec<(ComponentId, ReadinessState)> {
        let table = self.table.lock().expect("readiness lock");
        let mut out: Vec<_> = table
            .components
            .iter()
            .map(|(id, tx)| (id.clone(), tx.borrow().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Wait until a component is ready, has failed, or `cancel` is raised.
    ///
    /// Suspends only the calling task. A signal that is already raised
    /// returns `Cancelled` without starting a wait. A dropped cancel
    /// sender never cancels.
    pub async fn await_ready(
        &self,
        id: &ComponentId,
        cancel: &mut watch::Receiver<bool>,
    ) -> WaitOutcome {
        if *cancel.borrow() {
            return WaitOutcome::Cancelled;
        }

        let mut rx = {
            let mut table = self.table.lock().expect("readiness lock");
            table.channel(id).subscribe()
        };

        let settled = async {
            match rx.wait_for(ReadinessState::is_settled).await {
                Ok(state) => state.clone(),
                Err(_) => ReadinessState::TornDown,
            }
        };

        let cancelled = async {
            if cancel.wait_for(|raised| *raised).await.is_err() {
                std::future::pending::<()>().await;
            }
        };

        tokio::select! {
            biased;
            _ = cancelled => {
                debug!(component = %id, "readiness wait cancelled");
                WaitOutcome::Cancelled
            }
            state = settled => match state {
                ReadinessState::Ready => WaitOutcome::Ready,
                ReadinessState::Failed(reason) => WaitOutcome::Failed(reason),
                _ => WaitOutcome::Cancelled,
            },
        }
    }

    /// Tear down every component and release all waiters.
    pub fn shutdown(&self) {
        let mut table = self.table.lock().expect("readiness lock");
        table.torn_down = true;
        for tx in table.components.values() {
            tx.send_replace(ReadinessState::TornDown);
        }
        info!(components = table.components.len(), "readiness tracker torn down");
    }

    fn transition(&self, id: &ComponentId, next: ReadinessState) -> Result<(), ReadinessError> {
        let mut table = self.table.lock().expect("readiness lock");
        if table.torn_down {
            warn!(component = %id, state = next.as_str(), "readiness report after shutdown");
            return Err(ReadinessError::TornDown(id.clone()));
        }

        let tx = table.channel(id);
        let current = tx.borrow().clone();
        if current == next {
            return Ok(());
        }
        if !is_valid_transition(&current, &next) {
            return Err(ReadinessError::InvalidTransition {
                component: id.clone(),
                from: current,
                to: next,
            });
        }

        debug!(
            component = %id,
            state_from = current.as_str(),
            state_to = next.as_str(),
            "readiness transition"
        );
        tx.send_replace(next);
        Ok(())
    }
}

fn is_valid_transition(from: &ReadinessState, to: &ReadinessState) -> bool {
    use ReadinessState::*;
    matches!(
        (from, to),
        (NotStarted, Starting)
            | (NotStarted, Ready)
            | (NotStarted, Failed(_))
            | (Starting, Ready)
            | (Starting, Failed(_))
            | (Failed(_), Starting)
    )
}
