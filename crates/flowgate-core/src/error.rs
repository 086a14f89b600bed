//! Error types for topology validation and flow config parsing.

use thiserror::Error;

/// A topology that cannot be warmed or served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    #[error("deployment name must not be empty")]
    EmptyName,

    #[error("deployment name `{0}` must not contain `/` or `->`")]
    ReservedSeparator(String),

    #[error("deployment `{0}` declared more than once")]
    DuplicateDeployment(String),

    #[error("deployment `{0}` must have at least one shard")]
    ZeroShards(String),

    #[error("deployment `{0}` must have at least one replica")]
    ZeroReplicas(String),
}

/// Errors raised while loading a flow config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),

    #[error("gateway declares {protocols} protocol(s) but {ports} port(s)")]
    PortCountMismatch { protocols: usize, ports: usize },

    #[error("port {0} bound more than once")]
    DuplicatePort(u16),

    #[error("invalid duration `{0}`")]
    InvalidDuration(String),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}
