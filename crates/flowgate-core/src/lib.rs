//! flowgate-core — topology model and warmup endpoint registry for Flowgate.
//!
//! A flow is a gateway fronting a set of named deployments. Each
//! deployment is split into shards, each shard is replicated, and a
//! deployment with more than one shard gets a head that routes to them.
//!
//! # Architecture
//!
//! ```text
//! Gateway
//!   ├── executor0 (shards=2)
//!   │   └── head ──┬── shard-0 ── replica-0
//!   │              └── shard-1 ── replica-0
//!   └── executor1 (replicas=2)
//!       └── shard-0 ──┬── replica-0
//!                     └── replica-1
//! ```
//!
//! The [`registry`] turns a [`Topology`] into the deduplicated set of
//! [`Endpoint`]s that must be warmed after the flow starts, together
//! with the components each endpoint needs to be ready first.

pub mod config;
pub mod error;
pub mod registry;
pub mod topology;

pub use config::{DeploymentConfig, FlowConfig, GatewayConfig, Protocol, ProtocolBinding};
pub use error::{ConfigError, TopologyError};
pub use registry::{Edge, Endpoint, EndpointId, WarmupTargets, compute_warmup_targets};
pub use topology::{ComponentId, Deployment, Topology};
