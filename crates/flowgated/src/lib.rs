//! flowgated — runs a flow: its runtimes, its gateway, and warmup.
//!
//! ```text
//! Flow::start(options)
//!   ├── WarmupCoordinator::new()   (topology errors abort here)
//!   ├── LocalFlow                  (one status server per head / replica)
//!   ├── Gateway                    (one listener per protocol binding)
//!   └── WarmupCoordinator::activate(shutdown)
//!
//! Flow::shutdown()
//!   raise shutdown → join warmup → stop gateway → tear down readiness → join runtimes
//! ```

pub mod flow;
pub mod gateway;
pub mod runtime;
pub mod status;

pub use flow::{Flow, FlowOptions};
pub use gateway::Gateway;
pub use runtime::LocalFlow;
pub use status::StatusLog;
