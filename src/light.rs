use crate::lane_graph::LaneGraph;
use crate::path::LanePath;
use crate::{PathId, PathSet};
use std::collections::HashMap;

/// The phase of a traffic light governing a lane connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TrafficLightPhase {
    Red,
    Yellow,
    Green,
    Unknown,
}

impl TrafficLightPhase {
    /// Whether an approaching agent must stop at the connector's stop line.
    pub fn requires_stop(&self) -> bool {
        matches!(self, TrafficLightPhase::Red | TrafficLightPhase::Yellow)
    }
}

/// The traffic light state for one simulation step: a mapping from
/// lane-connector map ID to phase. Rebuilt by the caller every step.
pub type TrafficLightMap = HashMap<String, TrafficLightPhase>;

/// Finds the nearest stop line ahead of an agent that currently demands a
/// stop: the start of a red or yellow lane connector on the agent's path,
/// strictly ahead of `pos` and within `lookahead` metres. The search
/// continues one hop onto the downstream path. A connector with a green
/// or unknown phase, or one absent from the map, injects nothing.
///
/// # Returns
/// The distance from `pos` to the stop line, in m.
pub(crate) fn stop_line_ahead(
    paths: &PathSet,
    graph: &LaneGraph,
    path_id: PathId,
    pos: f64,
    lookahead: f64,
    lights: &TrafficLightMap,
) -> Option<f64> {
    let path = &paths[path_id];
    if let Some(dist) = scan_path(path, graph, pos, lookahead, lights) {
        return Some(dist);
    }

    let remaining = path.length() - pos;
    let downstream = path.downstream()?;
    scan_path(&paths[downstream], graph, 0.0, lookahead - remaining, lights)
        .map(|dist| dist + remaining)
}

fn scan_path(
    path: &LanePath,
    graph: &LaneGraph,
    pos: f64,
    lookahead: f64,
    lights: &TrafficLightMap,
) -> Option<f64> {
    path.connector_stops(graph)
        .filter(|(offset, _)| *offset > pos && *offset - pos <= lookahead)
        .find(|(_, map_id)| {
            lights
                .get(*map_id)
                .map(|phase| phase.requires_stop())
                .unwrap_or(false)
        })
        .map(|(offset, _)| offset - pos)
}
