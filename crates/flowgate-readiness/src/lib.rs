//! flowgate-readiness — process-wide startup tracking for flow components.
//!
//! Each runtime component (gateway, deployment, head, shard replica)
//! reports its own startup progress through [`ReadinessTracker`]. Other
//! tasks wait on a component with [`ReadinessTracker::await_ready`],
//! which is push-based and can be cut short by a shutdown signal.
//!
//! # State machine
//!
//! ```text
//! NotStarted ──► Starting ──► Ready
//!      │             │
//!      └─────────────┴──► Failed ──► Starting (restart)
//!
//! any ──► TornDown   (shutdown, terminal)
//! ```

pub mod error;
pub mod tracker;

pub use error::ReadinessError;
pub use tracker::{ReadinessState, ReadinessTracker, WaitOutcome};
