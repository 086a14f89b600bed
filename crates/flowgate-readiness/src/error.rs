//! Readiness tracker error types.

use flowgate_core::ComponentId;
use thiserror::Error;

use crate::tracker::ReadinessState;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReadinessError {
    #[error("component {component} cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        component: ComponentId,
        from: ReadinessState,
        to: ReadinessState,
    },

    #[error("component {0} reported after shutdown")]
    TornDown(ComponentId),
}
