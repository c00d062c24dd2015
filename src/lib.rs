pub use agent::{Agent, AgentAttributes, AgentState};
pub use builder::{build_agents_on_rails, RailSpawn};
pub use cgmath;
pub use detections::{AgentTrack, BoxExtent, DetectionsTracks, Pose, TrajectorySample};
pub use error::{SimError, SimResult};
pub use lane_graph::{Centerline, LaneGraph, LaneSegment, SegmentAttributes, SegmentKind};
pub use light::{TrafficLightMap, TrafficLightPhase};
pub use manager::{AgentManager, EgoState, SimulationConfig};
pub use observation::{
    IdmObservation, ObservationSource, ObservationType, ReplayObservation, SimulationIteration,
};
pub use path::LanePath;
pub use policy::{idm_acceleration, IdmParams, LeadKinematics};
pub use slotmap::{Key, KeyData};
pub use util::Interval;
use slotmap::{new_key_type, SlotMap};

mod agent;
mod builder;
mod debug;
mod detections;
mod error;
mod lane_graph;
mod light;
mod manager;
pub mod math;
mod observation;
mod occupancy;
mod path;
mod policy;
mod util;

new_key_type! {
    /// Unique ID of an [Agent].
    pub struct AgentId;
    /// Unique ID of a [LanePath].
    pub struct PathId;
    /// Unique ID of a [LaneSegment].
    pub struct SegmentId;
}

type AgentSet = SlotMap<AgentId, Agent>;
type PathSet = SlotMap<PathId, LanePath>;
type SegmentSet = SlotMap<SegmentId, LaneSegment>;
