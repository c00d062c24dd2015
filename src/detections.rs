use crate::AgentId;

/// A pose in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, anti-clockwise from the positive x-axis.
    pub heading: f64,
}

/// The bounding-box extent of an agent.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoxExtent {
    /// Length in m.
    pub length: f64,
    /// Width in m.
    pub width: f64,
}

/// One future sample of an agent's planned trajectory.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectorySample {
    /// Offset from the current step time, in s.
    pub time_offset: f64,
    pub pose: Pose,
    /// Velocity in m/s.
    pub velocity: f64,
}

/// A tracked agent in a detections snapshot.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AgentTrack {
    /// The agent's stable ID.
    pub agent: AgentId,
    pub pose: Pose,
    /// Velocity in m/s.
    pub velocity: f64,
    pub extent: BoxExtent,
    /// Short-horizon predicted trajectory, regenerated every step.
    pub trajectory: Vec<TrajectorySample>,
}

/// The detections output of one simulation step: an ordered sequence of
/// active agent records.
#[derive(Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectionsTracks {
    /// The simulation iteration the snapshot belongs to.
    pub iteration: usize,
    pub tracks: Vec<AgentTrack>,
}
