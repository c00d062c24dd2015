use crate::builder::{build_agents_on_rails, RailSpawn};
use crate::detections::DetectionsTracks;
use crate::error::{SimError, SimResult};
use crate::lane_graph::LaneGraph;
use crate::light::TrafficLightMap;
use crate::manager::{AgentManager, EgoState, SimulationConfig};
use crate::policy::IdmParams;

/// A point in simulation time.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SimulationIteration {
    /// The iteration index.
    pub index: usize,
    /// The timestamp of the iteration in s.
    pub time_s: f64,
}

/// The kind of observation a source produces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObservationType {
    DetectionsTracks,
}

/// A source of per-step agent observations. The IDM engine is one
/// concrete variant; [ReplayObservation] serves recorded frames instead.
pub trait ObservationSource {
    /// Resets the source to its pre-initialization state.
    fn reset(&mut self);

    /// The kind of observation this source produces.
    fn observation_type(&self) -> ObservationType;

    /// Gets the observation for the current iteration.
    fn get_observation(&self) -> SimResult<DetectionsTracks>;

    /// Advances the source from `iteration` to `next_iteration`.
    fn update_observation(
        &mut self,
        iteration: SimulationIteration,
        next_iteration: SimulationIteration,
        ego: &EgoState,
        lights: &TrafficLightMap,
    ) -> SimResult<()>;
}

/// Simulates agents with the intelligent driver model.
///
/// Construction is two-phase: the constructor only stores configuration
/// and spawn inputs, and [IdmObservation::initialize] builds the agent
/// manager, making initialization failure explicit. Using the source
/// before initializing it fails with [SimError::Uninitialized].
pub struct IdmObservation {
    graph: LaneGraph,
    spawns: Vec<RailSpawn>,
    params: IdmParams,
    config: SimulationConfig,
    current_iteration: usize,
    manager: Option<AgentManager>,
}

impl IdmObservation {
    /// Creates an uninitialized observation source.
    pub fn new(
        graph: LaneGraph,
        spawns: Vec<RailSpawn>,
        params: IdmParams,
        config: SimulationConfig,
    ) -> Self {
        Self {
            graph,
            spawns,
            params,
            config,
            current_iteration: 0,
            manager: None,
        }
    }

    /// Builds the agent manager from the stored spawn inputs.
    /// Does nothing if the source is already initialized.
    pub fn initialize(&mut self) -> SimResult<()> {
        if self.manager.is_none() {
            self.manager = Some(build_agents_on_rails(
                self.graph.clone(),
                &self.spawns,
                self.params,
                self.config,
            )?);
        }
        Ok(())
    }

    /// Gets the agent manager.
    pub fn manager(&self) -> SimResult<&AgentManager> {
        self.manager.as_ref().ok_or(SimError::Uninitialized)
    }

    /// Gets the agent manager mutably, e.g. to randomise desired
    /// velocities after initialization.
    pub fn manager_mut(&mut self) -> SimResult<&mut AgentManager> {
        self.manager.as_mut().ok_or(SimError::Uninitialized)
    }
}

impl ObservationSource for IdmObservation {
    fn reset(&mut self) {
        self.current_iteration = 0;
        self.manager = None;
    }

    fn observation_type(&self) -> ObservationType {
        ObservationType::DetectionsTracks
    }

    fn get_observation(&self) -> SimResult<DetectionsTracks> {
        self.manager()?.get_active_agents(
            self.current_iteration,
            self.config.planned_trajectory_samples,
            self.config.planned_trajectory_sample_interval,
        )
    }

    fn update_observation(
        &mut self,
        iteration: SimulationIteration,
        next_iteration: SimulationIteration,
        ego: &EgoState,
        lights: &TrafficLightMap,
    ) -> SimResult<()> {
        let dt = next_iteration.time_s - iteration.time_s;
        let manager = self.manager.as_mut().ok_or(SimError::Uninitialized)?;
        manager.propagate_agents(ego, dt, next_iteration.index, lights)?;
        self.current_iteration = next_iteration.index;
        Ok(())
    }
}

/// Replays pre-recorded detections instead of simulating them.
pub struct ReplayObservation {
    frames: Vec<DetectionsTracks>,
    current: usize,
}

impl ReplayObservation {
    /// Creates a replay source from recorded frames, one per iteration.
    pub fn new(frames: Vec<DetectionsTracks>) -> Self {
        Self { frames, current: 0 }
    }
}

impl ObservationSource for ReplayObservation {
    fn reset(&mut self) {
        self.current = 0;
    }

    fn observation_type(&self) -> ObservationType {
        ObservationType::DetectionsTracks
    }

    fn get_observation(&self) -> SimResult<DetectionsTracks> {
        self.frames
            .get(self.current)
            .cloned()
            .ok_or(SimError::Uninitialized)
    }

    fn update_observation(
        &mut self,
        iteration: SimulationIteration,
        next_iteration: SimulationIteration,
        _ego: &EgoState,
        _lights: &TrafficLightMap,
    ) -> SimResult<()> {
        let dt = next_iteration.time_s - iteration.time_s;
        if dt < 0.0 {
            return Err(SimError::InvalidTimestep { dt });
        }
        // Hold the final frame once the recording runs out.
        self.current = next_iteration
            .index
            .min(self.frames.len().saturating_sub(1));
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::detections::{AgentTrack, BoxExtent, Pose};
    use crate::math::Point2d;

    fn ego() -> EgoState {
        EgoState {
            position: Point2d::new(0.0, -100.0),
            heading: 0.0,
            velocity: 0.0,
            extent: BoxExtent {
                length: 5.0,
                width: 2.0,
            },
        }
    }

    fn step(index: usize, time_s: f64) -> SimulationIteration {
        SimulationIteration { index, time_s }
    }

    #[test]
    fn uninitialized_source_fails_fast() {
        let mut source = IdmObservation::new(
            LaneGraph::new(),
            vec![],
            IdmParams::default(),
            SimulationConfig::default(),
        );
        assert!(matches!(
            source.get_observation(),
            Err(SimError::Uninitialized)
        ));
        assert!(matches!(
            source.update_observation(step(0, 0.0), step(1, 0.1), &ego(), &TrafficLightMap::new()),
            Err(SimError::Uninitialized)
        ));

        source.initialize().unwrap();
        assert!(source.get_observation().is_ok());
    }

    #[test]
    fn reset_requires_reinitialization() {
        let mut source = IdmObservation::new(
            LaneGraph::new(),
            vec![],
            IdmParams::default(),
            SimulationConfig::default(),
        );
        source.initialize().unwrap();
        source.reset();
        assert!(matches!(
            source.get_observation(),
            Err(SimError::Uninitialized)
        ));
    }

    #[test]
    fn replay_serves_recorded_frames() {
        let frame = |iteration| DetectionsTracks {
            iteration,
            tracks: vec![AgentTrack {
                agent: crate::AgentId::default(),
                pose: Pose {
                    x: iteration as f64,
                    y: 0.0,
                    heading: 0.0,
                },
                velocity: 1.0,
                extent: BoxExtent {
                    length: 4.0,
                    width: 2.0,
                },
                trajectory: vec![],
            }],
        };
        let mut source = ReplayObservation::new(vec![frame(0), frame(1)]);
        assert_eq!(source.get_observation().unwrap().iteration, 0);

        source
            .update_observation(step(0, 0.0), step(1, 0.1), &ego(), &TrafficLightMap::new())
            .unwrap();
        assert_eq!(source.get_observation().unwrap().iteration, 1);

        // Past the end of the recording, the final frame holds.
        source
            .update_observation(step(1, 0.1), step(5, 0.5), &ego(), &TrafficLightMap::new())
            .unwrap();
        assert_eq!(source.get_observation().unwrap().iteration, 1);

        source.reset();
        assert_eq!(source.get_observation().unwrap().iteration, 0);
    }
}
