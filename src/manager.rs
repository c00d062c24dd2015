use crate::agent::{advance_kinematics, Agent};
use crate::debug::{debug_exit, debug_lead};
#[cfg(feature = "debug")]
use crate::debug::take_debug_frame;
use crate::detections::{AgentTrack, BoxExtent, DetectionsTracks, Pose, TrajectorySample};
use crate::error::{SimError, SimResult};
use crate::lane_graph::{CenterSample, LaneGraph};
use crate::light::{stop_line_ahead, TrafficLightMap};
use crate::math::{heading_of, Point2d};
use crate::occupancy::OccupancyIndex;
use crate::policy::{idm_acceleration, IdmParams, LeadKinematics};
use crate::{AgentId, AgentSet, PathId, PathSet};
use rand_distr::Distribution;
use slotmap::SecondaryMap;
use smallvec::SmallVec;

/// Floor applied to bumper-to-bumper gaps to avoid division blow-up
/// in the interaction term.
const GAP_FLOOR: f64 = 0.01; // m

/// Simulation-wide configuration of the agent manager.
#[derive(Clone, Copy, Debug)]
pub struct SimulationConfig {
    /// The minimum length of an agent's assigned path in m. Shorter rails
    /// are extended along successor segments, or skipped.
    pub minimum_path_length: f64,
    /// Number of samples in each agent's planned trajectory.
    pub planned_trajectory_samples: usize,
    /// Time interval between planned trajectory samples in s.
    pub planned_trajectory_sample_interval: f64,
    /// How far ahead of an agent stop lines and lead obstacles are
    /// considered, in m. Beyond this the agent is in free flow.
    pub stop_line_lookahead: f64,
    /// Maximum distance from a path's centre line at which the ego
    /// vehicle is treated as occupying that path, in m.
    pub ego_lateral_tolerance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            minimum_path_length: 20.0,
            planned_trajectory_samples: 6,
            planned_trajectory_sample_interval: 0.5,
            stop_line_lookahead: 50.0,
            ego_lateral_tolerance: 2.0,
        }
    }
}

/// The kinematic state of the ego vehicle. Input only: the manager never
/// advances the ego, but simulated agents treat it as an obstacle when it
/// occupies their lane.
#[derive(Clone, Copy, Debug)]
pub struct EgoState {
    /// The world-space position of the centre of the ego vehicle.
    pub position: Point2d,
    /// Heading in radians.
    pub heading: f64,
    /// Velocity in m/s.
    pub velocity: f64,
    /// Bounding-box extent.
    pub extent: BoxExtent,
}

/// The ego vehicle's footprint on one lane path, valid for a single step.
#[derive(Clone, Copy)]
struct EgoMark {
    pos: f64,
    vel: f64,
    half_len: f64,
}

/// A potential lead obstacle, real or virtual.
#[derive(Clone, Copy)]
struct LeadCandidate {
    net_distance: f64,
    velocity: f64,
    /// Real occupants win distance ties against virtual obstacles.
    real: bool,
}

fn closer(a: LeadCandidate, b: LeadCandidate) -> LeadCandidate {
    let b_wins =
        b.net_distance < a.net_distance || (b.net_distance == a.net_distance && b.real && !a.real);
    if b_wins {
        b
    } else {
        a
    }
}

/// Simulates a population of agents on a lane graph, advancing each with
/// the intelligent driver model once per step.
pub struct AgentManager {
    /// The lane graph the agents drive on.
    graph: LaneGraph,
    /// The lane paths agents are assigned to.
    paths: PathSet,
    /// The simulated agents.
    agents: AgentSet,
    /// Spatial index of agent positions, updated once per step.
    occupancy: OccupancyIndex,
    /// The car-following parameters, fixed at construction.
    params: IdmParams,
    config: SimulationConfig,
    /// Traffic light state of the most recent step.
    lights: TrafficLightMap,
    /// Ego footprints of the most recent step.
    ego_marks: SecondaryMap<PathId, EgoMark>,
    /// Debugging information from the previously simulated step.
    #[cfg(feature = "debug")]
    debug: serde_json::Value,
}

impl AgentManager {
    pub(crate) fn new(
        graph: LaneGraph,
        paths: PathSet,
        agents: AgentSet,
        occupancy: OccupancyIndex,
        params: IdmParams,
        config: SimulationConfig,
    ) -> Self {
        Self {
            graph,
            paths,
            agents,
            occupancy,
            params,
            config,
            lights: TrafficLightMap::new(),
            ego_marks: SecondaryMap::new(),
            #[cfg(feature = "debug")]
            debug: serde_json::Value::Null,
        }
    }

    /// The car-following parameters.
    pub fn params(&self) -> &IdmParams {
        &self.params
    }

    /// The manager's configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// The lane graph the agents drive on.
    pub fn graph(&self) -> &LaneGraph {
        &self.graph
    }

    /// Gets a reference to the agent with the given ID.
    pub fn get_agent(&self, id: AgentId) -> &Agent {
        &self.agents[id]
    }

    /// Gets a reference to the path with the given ID.
    pub fn get_path(&self, id: PathId) -> &crate::path::LanePath {
        &self.paths[id]
    }

    /// Returns an iterator over all the agents, active and exited.
    pub fn iter_agents(&self) -> impl Iterator<Item = &Agent> {
        self.agents.values()
    }

    /// Randomly assigns a desired velocity to each agent, sampled by
    /// scaling the target velocity with a factor drawn from a normal
    /// distribution with a mean of 1 and standard deviation of `stddev`.
    pub fn randomise_desired_velocities(&mut self, stddev: f64) {
        let mut rand = rand::thread_rng();
        let distr = rand_distr::Normal::new(1.0, stddev).expect("Invalid standard deviation");
        for (_, agent) in &mut self.agents {
            let factor = distr.sample(&mut rand).clamp(0.75, 1.25);
            agent.set_desired_vel(factor * self.params.target_velocity);
        }
    }

    /// Advances every active agent by `dt` seconds.
    ///
    /// All lead-agent queries read the occupancy index as it stood at the
    /// start of the step; the index is rewritten as a single batch after
    /// every agent's new state is known. A failed step commits nothing.
    ///
    /// # Parameters
    /// * `ego` - The ego vehicle state, treated as a potential obstacle
    /// * `dt` - The time step in seconds; fails fast if negative
    /// * `iteration` - The simulation iteration, for bookkeeping
    /// * `lights` - Lane-connector phases for this step
    pub fn propagate_agents(
        &mut self,
        ego: &EgoState,
        dt: f64,
        iteration: usize,
        lights: &TrafficLightMap,
    ) -> SimResult<()> {
        if dt < 0.0 {
            return Err(SimError::InvalidTimestep { dt });
        }

        self.lights = lights.clone();
        self.ego_marks = self.project_ego(ego);

        // Plan accelerations against the start-of-step occupancy.
        let mut moves: Vec<(AgentId, f64)> = Vec::with_capacity(self.agents.len());
        for (id, agent) in &self.agents {
            if !agent.is_active() {
                continue;
            }
            let lead = self.resolve_lead(agent)?;
            if let Some(lead) = lead {
                debug_lead(
                    id,
                    if lead.real { "agent" } else { "stop line" },
                    lead.net_distance,
                    lead.velocity,
                );
            }
            moves.push((id, self.acceleration_for(agent, lead)));
        }

        // Integrate.
        let mut exited: SmallVec<[AgentId; 4]> = SmallVec::new();
        for (id, acc) in &moves {
            let agent = &mut self.agents[*id];
            agent.integrate(*acc, dt);
            let path = &self.paths[agent.path()];
            if agent.pos() >= path.length() {
                match path.downstream() {
                    Some(next) => {
                        let overshoot =
                            (agent.pos() - path.length()).min(self.paths[next].length());
                        agent.continue_on(next, overshoot);
                    }
                    None => {
                        agent.mark_exited(path.length());
                        debug_exit(*id, path.length());
                        exited.push(*id);
                    }
                }
            }
        }

        // Commit the occupancy updates as one batch.
        for (id, _) in &moves {
            let agent = &self.agents[*id];
            if agent.is_active() {
                self.occupancy.update(*id, agent.path(), agent.pos());
            } else {
                self.occupancy.remove(*id);
                log::debug!("agent {:?} exited the network", id);
            }
        }

        log::debug!(
            "iteration {}: propagated {} agents, {} exited",
            iteration,
            moves.len(),
            exited.len()
        );

        #[cfg(feature = "debug")]
        {
            self.debug = take_debug_frame();
        }

        Ok(())
    }

    /// Builds a detections snapshot of every active agent: pose derived
    /// from its arc-length position, velocity, box extent, and a planned
    /// trajectory of `samples` future states spaced `interval` seconds
    /// apart. True agent state is not mutated.
    pub fn get_active_agents(
        &self,
        iteration: usize,
        samples: usize,
        interval: f64,
    ) -> SimResult<DetectionsTracks> {
        let mut tracks = Vec::new();
        for (id, agent) in &self.agents {
            if !agent.is_active() {
                continue;
            }
            let sample = self.paths[agent.path()].sample(agent.pos(), &self.graph);
            tracks.push(AgentTrack {
                agent: id,
                pose: pose_from(sample),
                velocity: agent.vel(),
                extent: BoxExtent {
                    length: agent.length(),
                    width: agent.width(),
                },
                trajectory: self.project_trajectory(agent, samples, interval)?,
            });
        }
        Ok(DetectionsTracks { iteration, tracks })
    }

    /// Gets the debugging information for the previously simulated step.
    #[cfg(feature = "debug")]
    pub fn debug(&mut self) -> serde_json::Value {
        self.debug.clone()
    }

    /// Resolves the lead obstacle for an agent: the nearest of the real
    /// occupancy lead, a red or yellow stop line, and the ego vehicle,
    /// all within the lookahead bound. An exact distance tie favours the
    /// real agent, so a queue already stopped at a line does not creep.
    fn resolve_lead(&self, agent: &Agent) -> SimResult<Option<LeadCandidate>> {
        let pos = agent.pos();
        let mut lead: Option<LeadCandidate> = None;

        if let Some(real) = self.occupancy.find_lead(agent.id, &self.paths)? {
            if real.distance <= self.config.stop_line_lookahead {
                let other = &self.agents[real.agent];
                lead = Some(LeadCandidate {
                    net_distance: real.distance - agent.half_length() - other.half_length(),
                    velocity: other.vel(),
                    real: true,
                });
            }
        }

        if let Some(dist) = stop_line_ahead(
            &self.paths,
            &self.graph,
            agent.path(),
            pos,
            self.config.stop_line_lookahead,
            &self.lights,
        ) {
            let candidate = LeadCandidate {
                net_distance: dist - agent.half_length(),
                velocity: 0.0,
                real: false,
            };
            lead = Some(lead.map_or(candidate, |cur| closer(cur, candidate)));
        }

        if let Some(mark) = self.ego_marks.get(agent.path()).copied() {
            let dist = mark.pos - pos;
            if dist > 0.0 && dist <= self.config.stop_line_lookahead {
                let candidate = LeadCandidate {
                    net_distance: dist - agent.half_length() - mark.half_len,
                    velocity: mark.vel,
                    real: true,
                };
                lead = Some(lead.map_or(candidate, |cur| closer(cur, candidate)));
            }
        }

        Ok(lead)
    }

    /// Applies the car-following model for an agent and its chosen lead.
    fn acceleration_for(&self, agent: &Agent, lead: Option<LeadCandidate>) -> f64 {
        let kinematics = lead.map(|c| LeadKinematics {
            net_distance: c.net_distance.max(GAP_FLOOR),
            velocity: c.velocity,
        });
        let desired = self.desired_velocity(agent.path(), agent.pos(), agent.desired_vel());
        idm_acceleration(&self.params, agent.vel(), desired, kinematics.as_ref())
    }

    /// The agent's desired velocity, capped by the local speed limit.
    fn desired_velocity(&self, path: PathId, pos: f64, agent_desired: f64) -> f64 {
        let (seg, _) = self.paths[path].segment_at(pos);
        agent_desired.min(self.graph.segment(seg.segment).speed_limit())
    }

    /// Forward-integrates an agent's car-following behaviour into a short
    /// planned trajectory, on a disposable copy of its state. The lead
    /// chosen at the current step advances at constant velocity.
    fn project_trajectory(
        &self,
        agent: &Agent,
        samples: usize,
        interval: f64,
    ) -> SimResult<Vec<TrajectorySample>> {
        let mut lead = self.resolve_lead(agent)?;
        let mut path_id = agent.path();
        let mut pos = agent.pos();
        let mut vel = agent.vel();

        let mut out = Vec::with_capacity(samples);
        for k in 1..=samples {
            let kinematics = lead.map(|c| LeadKinematics {
                net_distance: c.net_distance.max(GAP_FLOOR),
                velocity: c.velocity,
            });
            let desired = self.desired_velocity(path_id, pos, agent.desired_vel());
            let acc = idm_acceleration(&self.params, vel, desired, kinematics.as_ref());
            let (new_vel, ds) = advance_kinematics(vel, acc, interval);
            vel = new_vel;
            pos += ds;
            if let Some(c) = lead.as_mut() {
                c.net_distance += c.velocity * interval - ds;
            }

            let path = &self.paths[path_id];
            if pos > path.length() {
                match path.downstream() {
                    Some(next) => {
                        pos -= path.length();
                        path_id = next;
                    }
                    None => pos = path.length(),
                }
            }

            out.push(TrajectorySample {
                time_offset: k as f64 * interval,
                pose: pose_from(self.paths[path_id].sample(pos, &self.graph)),
                velocity: vel,
            });
        }
        Ok(out)
    }

    /// Projects the ego vehicle onto every path whose centre line passes
    /// within the lateral tolerance, producing transient footprints that
    /// act as obstacles for this step only.
    fn project_ego(&self, ego: &EgoState) -> SecondaryMap<PathId, EgoMark> {
        let mut marks = SecondaryMap::new();
        for (id, path) in &self.paths {
            let (pos, dist) = path.project(ego.position, &self.graph);
            if dist <= self.config.ego_lateral_tolerance {
                marks.insert(
                    id,
                    EgoMark {
                        pos,
                        vel: ego.velocity,
                        half_len: 0.5 * ego.extent.length,
                    },
                );
            }
        }
        marks
    }
}

fn pose_from(sample: CenterSample) -> Pose {
    Pose {
        x: sample.pos.x,
        y: sample.pos.y,
        heading: heading_of(sample.tan),
    }
}
