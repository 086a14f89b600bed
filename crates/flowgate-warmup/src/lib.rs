//! flowgate-warmup — pre-warming the network paths of a flow.
//!
//! Right after the gateway's listeners come up, the coordinator sends one
//! lightweight status probe down every edge computed by the endpoint
//! registry, as soon as the components behind that edge are ready.
//!
//! # Architecture
//!
//! ```text
//! WarmupCoordinator::activate(cancel)
//!   └── supervisor task (owns a JoinSet)
//!       ├── per-endpoint task
//!       │   ├── ReadinessTracker::await_ready() for each dependency
//!       │   ├── dispatched guard (at most one probe per endpoint)
//!       │   └── StatusProbe::probe() → ProbeOutcome
//!       └── WarmupReport on join
//! ```
//!
//! Warmup is best effort. Probe failures and readiness failures are
//! logged and recorded, never propagated; only a malformed topology
//! fails the coordinator.

pub mod address;
pub mod coordinator;
pub mod error;
pub mod probe;
pub mod report;

pub use address::AddressBook;
pub use coordinator::{WarmupCoordinator, WarmupHandle, WarmupPhase};
pub use error::WarmupError;
pub use probe::{HttpStatusProbe, PROBE_TIMEOUT, ProbeOutcome, STATUS_PATH, StatusProbe};
pub use report::{EndpointOutcome, SkipReason, WarmupReport};
