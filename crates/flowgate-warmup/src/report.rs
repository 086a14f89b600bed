//! Warmup report — what happened to each endpoint in one epoch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use flowgate_core::{ComponentId, EndpointId};

use crate::probe::ProbeOutcome;

/// Why an endpoint was never probed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "skip", rename_all = "snake_case")]
pub enum SkipReason {
    /// Shutdown arrived before the endpoint's dependencies were ready.
    Cancelled,
    /// A dependency reported a failed startup.
    TargetFailed {
        component: ComponentId,
        reason: String,
    },
    /// The external readiness deadline expired first.
    ReadinessTimeout,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointOutcome {
    Probed(ProbeOutcome),
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarmupReport {
    outcomes: BTreeMap<EndpointId, EndpointOutcome>,
}

impl WarmupReport {
    /// Record the outcome of an endpoint. The first record wins.
    pub(crate) fn record(&mut self, id: EndpointId, outcome: EndpointOutcome) {
        self.outcomes.entry(id).or_insert(outcome);
    }

    /// Mark every endpoint without an outcome as cancelled.
    pub(crate) fn fill_cancelled<'a>(&mut self, ids: impl Iterator<Item = &'a EndpointId>) {
        for id in ids {
            self.record(id.clone(), EndpointOutcome::Skipped(SkipReason::Cancelled));
        }
    }

    pub fn outcome(&self, id: &EndpointId) -> Option<&EndpointOutcome> {
        self.outcomes.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EndpointId, &EndpointOutcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Endpoints a probe was dispatched to.
    pub fn probed(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, EndpointOutcome::Probed(_)))
            .count()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, EndpointOutcome::Probed(ProbeOutcome::Success)))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.probed() - self.succeeded()
    }

    pub fn skipped(&self) -> usize {
        self.len() - self.probed()
    }
}
