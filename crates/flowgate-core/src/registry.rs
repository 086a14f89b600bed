//! Endpoint registry — derives the warmup fan-out from a topology.
//!
//! Every deployment contributes one gateway→deployment edge. A
//! multi-shard deployment additionally contributes one head→shard edge
//! per shard and one gateway→shard edge that goes through the head to a
//! representative shard, so the whole path is warmed once end to end.
//! Replicas sit behind one load-balanced address and are never warmed
//! individually.
//!
//! The computation is a pure function of the topology: the same
//! topology always yields the same ordered set.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;
use crate::topology::{ComponentId, Deployment, Topology};

/// Shard targeted by the end-to-end probe of a multi-shard deployment.
const REPRESENTATIVE_SHARD: u32 = 0;

/// One warmed network edge.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Edge {
    GatewayToDeployment { deployment: String },
    HeadToShard { deployment: String, shard: u32 },
    /// Gateway through the head down to one shard.
    GatewayToShard { deployment: String, shard: u32 },
}

impl Edge {
    pub fn deployment(&self) -> &str {
        match self {
            Edge::GatewayToDeployment { deployment }
            | Edge::HeadToShard { deployment, .. }
            | Edge::GatewayToShard { deployment, .. } => deployment,
        }
    }

    /// Canonical identity of this edge.
    pub fn id(&self) -> EndpointId {
        let key = match self {
            Edge::GatewayToDeployment { deployment } => format!("gateway->{deployment}"),
            Edge::HeadToShard { deployment, shard } => {
                format!("{deployment}/head->{deployment}/shard-{shard}")
            }
            Edge::GatewayToShard { deployment, shard } => {
                format!("gateway->{deployment}/head->{deployment}/shard-{shard}")
            }
        };
        EndpointId(key)
    }
}

/// Stable identity of an endpoint, used for dedup and ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An addressable warmup target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,
    pub edge: Edge,
    /// Components that must be ready before the endpoint is probed.
    pub dependencies: Vec<ComponentId>,
    /// Load-balanced components any one of which may answer the probe.
    pub addressees: Vec<ComponentId>,
}

impl Endpoint {
    fn new(edge: Edge, dependencies: Vec<ComponentId>, addressees: Vec<ComponentId>) -> Self {
        Self {
            id: edge.id(),
            edge,
            dependencies,
            addressees,
        }
    }
}

/// The deduplicated, ordered warmup set of a topology.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupTargets {
    endpoints: BTreeMap<EndpointId, Endpoint>,
}

impl WarmupTargets {
    fn insert(&mut self, endpoint: Endpoint) {
        self.endpoints.entry(endpoint.id.clone()).or_insert(endpoint);
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn get(&self, id: &EndpointId) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.endpoints.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EndpointId> {
        self.endpoints.keys()
    }
}

impl IntoIterator for WarmupTargets {
    type Item = Endpoint;
    type IntoIter = std::collections::btree_map::IntoValues<EndpointId, Endpoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.endpoints.into_values()
    }
}

/// Compute the warmup targets of a topology.
///
/// Fails only when the topology itself is malformed.
pub fn compute_warmup_targets(topology: &Topology) -> Result<WarmupTargets, TopologyError> {
    topology.validate()?;

    let mut targets = WarmupTargets::default();
    for deployment in &topology.deployments {
        for endpoint in deployment_endpoints(deployment) {
            targets.insert(endpoint);
        }
    }

    tracing::debug!(
        deployments = topology.deployments.len(),
        targets = targets.len(),
        "computed warmup targets"
    );
    Ok(targets)
}

fn deployment_endpoints(deployment: &Deployment) -> Vec<Endpoint> {
    let name = deployment.name.clone();

    if !deployment.has_head() {
        let replicas = deployment.shard_replicas(0);
        return vec![Endpoint::new(
            Edge::GatewayToDeployment { deployment: name },
            replicas.clone(),
            replicas,
        )];
    }

    let head = ComponentId::head(&name);
    let mut out = Vec::with_capacity(deployment.shards as usize + 2);
    out.push(Endpoint::new(
        Edge::GatewayToDeployment {
            deployment: name.clone(),
        },
        vec![head.clone()],
        vec![head.clone()],
    ));

    for shard in 0..deployment.shards {
        let replicas = deployment.shard_replicas(shard);
        out.push(Endpoint::new(
            Edge::HeadToShard {
                deployment: name.clone(),
                shard,
            },
            replicas.clone(),
            replicas,
        ));
    }

    let replicas = deployment.shard_replicas(REPRESENTATIVE_SHARD);
    let mut dependencies = Vec::with_capacity(replicas.len() + 1);
    dependencies.push(head);
    dependencies.extend(replicas.iter().cloned());
    out.push(Endpoint::new(
        Edge::GatewayToShard {
            deployment: name,
            shard: REPRESENTATIVE_SHARD,
        },
        dependencies,
        replicas,
    ));

    out
}
