//! flow.toml configuration parser.
//!
//! ```toml
//! [gateway]
//! protocols = ["http", "grpc", "websocket"]
//! ports = [8080, 8081, 8082]
//! warmup_deadline = "30s"
//!
//! [[deployments]]
//! name = "executor0"
//! shards = 2
//!
//! [[deployments]]
//! name = "executor1"
//! replicas = 2
//! startup_delay = "3s"
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::topology::{Deployment, Topology};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub deployments: Vec<DeploymentConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,
    #[serde(default)]
    pub ports: Vec<u16>,
    pub warmup_deadline: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            protocols: default_protocols(),
            ports: Vec::new(),
            warmup_deadline: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    #[serde(default = "default_count")]
    pub shards: u32,
    #[serde(default = "default_count")]
    pub replicas: u32,
    pub startup_delay: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_protocols() -> Vec<String> {
    vec!["grpc".to_string()]
}

fn default_count() -> u32 {
    1
}

/// Wire protocol served by one gateway front-end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Http,
    Grpc,
    Websocket,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Grpc => "grpc",
            Protocol::Websocket => "websocket",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "grpc" => Ok(Protocol::Grpc),
            "websocket" | "ws" => Ok(Protocol::Websocket),
            other => Err(ConfigError::UnknownProtocol(other.to_string())),
        }
    }
}

/// A (protocol, port) pair bound by the gateway. Port 0 means ephemeral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolBinding {
    pub protocol: Protocol,
    pub port: u16,
}

impl ProtocolBinding {
    pub fn new(protocol: Protocol, port: u16) -> Self {
        Self { protocol, port }
    }
}

impl FlowConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        content.parse()
    }

    /// Structural topology of the configured deployments.
    pub fn topology(&self) -> Result<Topology, ConfigError> {
        let topology = Topology::new(
            self.deployments
                .iter()
                .map(|d| Deployment::new(&d.name, d.shards, d.replicas))
                .collect(),
        );
        topology.validate()?;
        Ok(topology)
    }

    /// Gateway front-ends, one per configured protocol.
    pub fn bindings(&self) -> Result<Vec<ProtocolBinding>, ConfigError> {
        let gateway = &self.gateway;
        let protocols = gateway
            .protocols
            .iter()
            .map(|p| p.parse::<Protocol>())
            .collect::<Result<Vec<_>, _>>()?;

        if gateway.ports.is_empty() {
            return Ok(protocols
                .into_iter()
                .map(|p| ProtocolBinding::new(p, 0))
                .collect());
        }

        if gateway.ports.len() != protocols.len() {
            return Err(ConfigError::PortCountMismatch {
                protocols: protocols.len(),
                ports: gateway.ports.len(),
            });
        }

        let mut seen = HashSet::new();
        for port in &gateway.ports {
            if *port != 0 && !seen.insert(*port) {
                return Err(ConfigError::DuplicatePort(*port));
            }
        }

        Ok(protocols
            .into_iter()
            .zip(gateway.ports.iter().copied())
            .map(|(protocol, port)| ProtocolBinding::new(protocol, port))
            .collect())
    }

    pub fn warmup_deadline(&self) -> Result<Option<Duration>, ConfigError> {
        self.gateway
            .warmup_deadline
            .as_deref()
            .map(parse_duration)
            .transpose()
    }

    /// Startup delay of a deployment's runtimes, zero when unset.
    pub fn startup_delay(&self, deployment: &str) -> Result<Duration, ConfigError> {
        let delay = self
            .deployments
            .iter()
            .find(|d| d.name == deployment)
            .and_then(|d| d.startup_delay.as_deref());
        match delay {
            Some(s) => parse_duration(s),
            None => Ok(Duration::ZERO),
        }
    }
}

impl FromStr for FlowConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: FlowConfig = toml::from_str(s)?;
        Ok(config)
    }
}

/// Parse a duration string like "5s", "500ms", "1m", or bare seconds.
pub fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    let trimmed = s.trim();
    let parsed = if let Some(ms) = trimmed.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = trimmed.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = trimmed.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        trimmed.parse::<u64>().ok().map(Duration::from_secs)
    };
    parsed.ok_or_else(|| ConfigError::InvalidDuration(s.to_string()))
}
