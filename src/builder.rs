use crate::agent::{Agent, AgentAttributes};
use crate::error::{SimError, SimResult};
use crate::lane_graph::LaneGraph;
use crate::manager::{AgentManager, SimulationConfig};
use crate::occupancy::OccupancyIndex;
use crate::path::LanePath;
use crate::policy::IdmParams;
use crate::{AgentSet, PathId, PathSet, SegmentId};
use itertools::unfold;
use std::collections::HashMap;

/// Declarative description of one agent spawned on a map rail.
#[derive(Clone, Debug)]
pub struct RailSpawn {
    /// The ordered lane/lane-connector chain the agent drives along.
    pub segments: Vec<SegmentId>,
    /// Starting arc-length position along the chain, in m.
    pub start_pos: f64,
    /// Starting velocity in m/s.
    pub velocity: f64,
    /// Body length in m.
    pub length: f64,
    /// Body width in m.
    pub width: f64,
}

/// Builds an [AgentManager] from rail spawn specifications.
///
/// Rails shorter than the configured minimum path length are extended
/// along successor segments; spawns whose rail still falls short are
/// skipped with a warning. Spawns sharing an identical chain share one
/// path. Each agent starts with the simulation-wide target velocity as
/// its desired velocity; see
/// [AgentManager::randomise_desired_velocities] to spread them.
pub fn build_agents_on_rails(
    graph: LaneGraph,
    spawns: &[RailSpawn],
    params: IdmParams,
    config: SimulationConfig,
) -> SimResult<AgentManager> {
    let mut paths = PathSet::default();
    let mut agents = AgentSet::default();
    let mut occupancy = OccupancyIndex::new();
    let mut path_by_chain: HashMap<Vec<SegmentId>, PathId> = HashMap::new();

    for spawn in spawns {
        let chain = extend_chain(&spawn.segments, &graph, config.minimum_path_length);
        let total: f64 = chain.iter().map(|id| graph.segment(*id).length()).sum();
        if total < config.minimum_path_length {
            log::warn!(
                "skipping spawn on a {:.1} m rail, shorter than the {:.1} m minimum",
                total,
                config.minimum_path_length
            );
            continue;
        }

        let path_id = match path_by_chain.get(&chain) {
            Some(id) => *id,
            None => {
                let id = paths.insert(LanePath::new(&chain, &graph)?);
                path_by_chain.insert(chain, id);
                id
            }
        };

        if !(0.0..paths[path_id].length()).contains(&spawn.start_pos) {
            return Err(SimError::MalformedPath {
                reason: format!(
                    "spawn position {:.1} m lies outside its {:.1} m path",
                    spawn.start_pos,
                    paths[path_id].length()
                ),
            });
        }

        let agent_id = agents.insert_with_key(|id| {
            Agent::new(
                id,
                path_id,
                spawn.start_pos,
                &AgentAttributes {
                    length: spawn.length,
                    width: spawn.width,
                    velocity: spawn.velocity,
                    desired_velocity: params.target_velocity,
                },
            )
        });
        occupancy.update(agent_id, path_id, spawn.start_pos);
    }

    // Wire the single-hop downstream continuation of each path: the first
    // path that starts on a successor of its last segment.
    let starts: HashMap<SegmentId, PathId> = paths
        .iter()
        .map(|(id, path)| (path.first_segment(), id))
        .collect();
    let mut continuations: Vec<(PathId, PathId)> = vec![];
    for (id, path) in &paths {
        let successors = graph.segment(path.last_segment()).successors();
        if let Some(next) = successors.iter().find_map(|seg| starts.get(seg).copied()) {
            if next != id {
                continuations.push((id, next));
            }
        }
    }
    for (from, to) in continuations {
        paths[from].set_downstream(to);
    }

    log::info!("built {} agents on {} paths", agents.len(), paths.len());
    Ok(AgentManager::new(
        graph, paths, agents, occupancy, params, config,
    ))
}

/// Greedily extends a segment chain along successor segments until it
/// reaches the minimum length, runs out of successors, or would loop.
fn extend_chain(segments: &[SegmentId], graph: &LaneGraph, min_length: f64) -> Vec<SegmentId> {
    let mut chain = segments.to_vec();
    let mut total: f64 = chain.iter().map(|id| graph.segment(*id).length()).sum();

    if let Some(last) = chain.last().copied() {
        let walk = unfold(last, |seg| {
            *seg = *graph.segment(*seg).successors().first()?;
            Some(*seg)
        });
        for seg in walk {
            if total >= min_length || chain.contains(&seg) {
                break;
            }
            total += graph.segment(seg).length();
            chain.push(seg);
        }
    }

    chain
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::lane_graph::{SegmentAttributes, SegmentKind};
    use crate::math::Point2d;
    use assert_approx_eq::assert_approx_eq;

    fn lane(graph: &mut LaneGraph, map_id: &str, x0: f64, x1: f64) -> SegmentId {
        graph
            .add_segment(&SegmentAttributes {
                kind: SegmentKind::Lane,
                map_id,
                waypoints: &[Point2d::new(x0, 0.0), Point2d::new(x1, 0.0)],
                speed_limit: 13.0,
            })
            .unwrap()
    }

    fn spawn(segments: Vec<SegmentId>, start_pos: f64) -> RailSpawn {
        RailSpawn {
            segments,
            start_pos,
            velocity: 0.0,
            length: 4.0,
            width: 2.0,
        }
    }

    #[test]
    fn short_rails_extend_along_successors() {
        let mut graph = LaneGraph::new();
        let a = lane(&mut graph, "a", 0.0, 10.0);
        let b = lane(&mut graph, "b", 10.0, 25.0);
        graph.connect(a, b);

        let chain = extend_chain(&[a], &graph, 20.0);
        assert_eq!(chain, vec![a, b]);

        let manager = build_agents_on_rails(
            graph,
            &[spawn(vec![a], 2.0)],
            IdmParams::default(),
            SimulationConfig::default(),
        )
        .unwrap();
        assert_eq!(manager.iter_agents().count(), 1);
    }

    #[test]
    fn rails_below_minimum_are_skipped() {
        let mut graph = LaneGraph::new();
        let a = lane(&mut graph, "a", 0.0, 10.0);

        let manager = build_agents_on_rails(
            graph,
            &[spawn(vec![a], 2.0)],
            IdmParams::default(),
            SimulationConfig::default(),
        )
        .unwrap();
        assert_eq!(manager.iter_agents().count(), 0);
    }

    #[test]
    fn identical_rails_share_a_path() {
        let mut graph = LaneGraph::new();
        let a = lane(&mut graph, "a", 0.0, 50.0);

        let manager = build_agents_on_rails(
            graph,
            &[spawn(vec![a], 5.0), spawn(vec![a], 25.0)],
            IdmParams::default(),
            SimulationConfig::default(),
        )
        .unwrap();
        let mut paths: Vec<_> = manager.iter_agents().map(|agent| agent.path()).collect();
        paths.dedup();
        assert_eq!(paths.len(), 1);
    }

    #[test]
    fn spawn_outside_its_path_is_malformed() {
        let mut graph = LaneGraph::new();
        let a = lane(&mut graph, "a", 0.0, 50.0);

        let result = build_agents_on_rails(
            graph,
            &[spawn(vec![a], 60.0)],
            IdmParams::default(),
            SimulationConfig::default(),
        );
        assert!(matches!(result, Err(SimError::MalformedPath { .. })));
    }

    #[test]
    fn consecutive_rails_are_wired_downstream() {
        let mut graph = LaneGraph::new();
        let a = lane(&mut graph, "a", 0.0, 30.0);
        let b = lane(&mut graph, "b", 30.0, 60.0);
        graph.connect(a, b);

        let manager = build_agents_on_rails(
            graph,
            &[spawn(vec![a], 5.0), spawn(vec![b], 5.0)],
            IdmParams::default(),
            SimulationConfig::default(),
        )
        .unwrap();
        let agents: Vec<_> = manager.iter_agents().collect();
        assert_approx_eq!(agents[0].pos(), 5.0);
        assert_ne!(agents[0].path(), agents[1].path());
        assert_eq!(
            manager.get_path(agents[0].path()).downstream(),
            Some(agents[1].path())
        );
    }
}
