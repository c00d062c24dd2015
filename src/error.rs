use crate::AgentId;
use thiserror::Error;

/// Errors surfaced by the simulation engine.
///
/// Precondition violations are fatal for the call that detects them;
/// a failed step leaves the previously committed state intact.
#[derive(Debug, Error)]
pub enum SimError {
    /// The timestep passed to a propagation call was negative.
    #[error("invalid timestep: {dt} s")]
    InvalidTimestep { dt: f64 },

    /// An agent ID was queried that the occupancy index does not track.
    #[error("agent {0:?} is not tracked by the occupancy index")]
    UnknownAgent(AgentId),

    /// A lane path could not be assembled into a monotonic arc-length chain.
    #[error("malformed lane path: {reason}")]
    MalformedPath { reason: String },

    /// An observation source was used before being initialized.
    #[error("observation source has not been initialized")]
    Uninitialized,
}

pub type SimResult<T> = Result<T, SimError>;
