//! Flow topology — deployments, heads, shards, and replicas.
//!
//! The topology is built once when the flow is constructed and never
//! changes afterwards. It carries structure only; where each runtime
//! listens is decided when the runtime starts.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TopologyError;

/// Identity of a runtime component whose readiness is tracked.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ComponentId {
    /// The gateway itself.
    Gateway,
    /// A deployment as a whole (ready once all its runtimes are).
    Deployment { name: String },
    /// The head routing to the shards of a multi-shard deployment.
    Head { deployment: String },
    /// One replica of one shard.
    Replica {
        deployment: String,
        shard: u32,
        replica: u32,
    },
}

impl ComponentId {
    pub fn deployment(name: &str) -> Self {
        ComponentId::Deployment {
            name: name.to_string(),
        }
    }

    pub fn head(deployment: &str) -> Self {
        ComponentId::Head {
            deployment: deployment.to_string(),
        }
    }

    pub fn replica(deployment: &str, shard: u32, replica: u32) -> Self {
        ComponentId::Replica {
            deployment: deployment.to_string(),
            shard,
            replica,
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Gateway => f.write_str("gateway"),
            ComponentId::Deployment { name } => f.write_str(name),
            ComponentId::Head { deployment } => write!(f, "{deployment}/head"),
            ComponentId::Replica {
                deployment,
                shard,
                replica,
            } => write!(f, "{deployment}/shard-{shard}/replica-{replica}"),
        }
    }
}

/// A named deployment with its shard and replica counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub shards: u32,
    pub replicas: u32,
}

impl Deployment {
    pub fn new(name: &str, shards: u32, replicas: u32) -> Self {
        Self {
            name: name.to_string(),
            shards,
            replicas,
        }
    }

    /// Whether a head is placed in front of the shards.
    pub fn has_head(&self) -> bool {
        self.shards > 1
    }

    /// All replicas of one shard, in replica order.
    pub fn shard_replicas(&self, shard: u32) -> Vec<ComponentId> {
        (0..self.replicas)
            .map(|replica| ComponentId::replica(&self.name, shard, replica))
            .collect()
    }

    /// Every runtime component of this deployment: the head (if any)
    /// followed by all shard replicas.
    pub fn runtimes(&self) -> Vec<ComponentId> {
        let mut out = Vec::new();
        if self.has_head() {
            out.push(ComponentId::head(&self.name));
        }
        for shard in 0..self.shards {
            out.extend(self.shard_replicas(shard));
        }
        out
    }
}

/// The deployments fronted by one gateway, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub deployments: Vec<Deployment>,
}

impl Topology {
    pub fn new(deployments: Vec<Deployment>) -> Self {
        Self { deployments }
    }

    /// Append a deployment (builder style).
    pub fn with(mut self, deployment: Deployment) -> Self {
        self.deployments.push(deployment);
        self
    }

    /// Check the structural invariants every consumer relies on.
    pub fn validate(&self) -> Result<(), TopologyError> {
        let mut seen = HashSet::new();
        for deployment in &self.deployments {
            if deployment.name.trim().is_empty() {
                return Err(TopologyError::EmptyName);
            }
            // Component and endpoint keys are built from these separators.
            if deployment.name.contains('/') || deployment.name.contains("->") {
                return Err(TopologyError::ReservedSeparator(deployment.name.clone()));
            }
            if !seen.insert(deployment.name.as_str()) {
                return Err(TopologyError::DuplicateDeployment(deployment.name.clone()));
            }
            if deployment.shards == 0 {
                return Err(TopologyError::ZeroShards(deployment.name.clone()));
            }
            if deployment.replicas == 0 {
                return Err(TopologyError::ZeroReplicas(deployment.name.clone()));
            }
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Deployment> {
        self.deployments.iter().find(|d| d.name == name)
    }

    /// Every runtime component across all deployments (gateway excluded).
    pub fn components(&self) -> Vec<ComponentId> {
        self.deployments.iter().flat_map(|d| d.runtimes()).collect()
    }
}
