use crate::error::{SimError, SimResult};
use crate::{AgentId, PathId, PathSet};
use slotmap::SecondaryMap;
use std::collections::BTreeMap;
use std::ops::Bound;

/// A single occupant record held by the index.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct OccRecord {
    /// The path the agent occupies.
    pub path: PathId,
    /// The agent's arc-length position along the path, in m.
    pub pos: f64,
}

/// The nearest occupant ahead of a querying agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct LeadOccupant {
    /// The occupant acting as lead.
    pub agent: AgentId,
    /// Centre-to-centre distance ahead of the querying agent, in m.
    pub distance: f64,
}

/// Orders occupants by arc-length position, with the agent key as a
/// deterministic secondary key for coincident positions.
#[derive(Clone, Copy, Debug)]
struct OccKey {
    pos: f64,
    agent: AgentId,
}

impl PartialEq for OccKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OccKey {}

impl PartialOrd for OccKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OccKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.pos
            .total_cmp(&other.pos)
            .then_with(|| self.agent.cmp(&other.agent))
    }
}

/// Maintains, per lane path, an ordered-by-arc-length set of occupants,
/// supporting nearest-lead queries with a single-hop downstream lookahead.
#[derive(Default)]
pub(crate) struct OccupancyIndex {
    /// The current record of each tracked agent.
    records: SecondaryMap<AgentId, OccRecord>,
    /// Per-path occupant sets ordered by position.
    lanes: SecondaryMap<PathId, BTreeMap<OccKey, AgentId>>,
}

impl OccupancyIndex {
    pub fn new() -> Self {
        Default::default()
    }

    /// Inserts or repositions an agent, replacing any prior record.
    pub fn update(&mut self, agent: AgentId, path: PathId, pos: f64) {
        self.evict(agent);
        if !self.lanes.contains_key(path) {
            self.lanes.insert(path, BTreeMap::new());
        }
        self.lanes[path].insert(OccKey { pos, agent }, agent);
        self.records.insert(agent, OccRecord { path, pos });
    }

    /// Removes an agent from the index, e.g. when it exits the network.
    pub fn remove(&mut self, agent: AgentId) {
        self.evict(agent);
        self.records.remove(agent);
    }

    fn evict(&mut self, agent: AgentId) {
        if let Some(old) = self.records.get(agent) {
            self.lanes[old.path].remove(&OccKey {
                pos: old.pos,
                agent,
            });
        }
    }

    /// Gets the current record of an agent.
    pub fn record(&self, agent: AgentId) -> SimResult<OccRecord> {
        self.records
            .get(agent)
            .copied()
            .ok_or(SimError::UnknownAgent(agent))
    }

    /// Finds the occupant nearest ahead of the given agent: the smallest
    /// position strictly greater than the agent's own on the same path,
    /// falling back to the first occupant of the immediately connected
    /// downstream path. An agent is never its own lead. Coincident
    /// occupants resolve deterministically by key order.
    pub fn find_lead(&self, agent: AgentId, paths: &PathSet) -> SimResult<Option<LeadOccupant>> {
        let rec = self.record(agent)?;
        let own = OccKey {
            pos: rec.pos,
            agent,
        };
        let lane = match self.lanes.get(rec.path) {
            Some(lane) => lane,
            None => return Err(SimError::UnknownAgent(agent)),
        };

        // A coincident occupant with an earlier key is treated as ahead.
        let coincident = lane
            .range(..own)
            .next_back()
            .filter(|(key, _)| key.pos == rec.pos)
            .map(|(_, id)| LeadOccupant {
                agent: *id,
                distance: 0.0,
            });
        if coincident.is_some() {
            return Ok(coincident);
        }

        let ahead = lane
            .range((Bound::Excluded(own), Bound::Unbounded))
            .find(|(key, _)| key.pos > rec.pos)
            .map(|(key, id)| LeadOccupant {
                agent: *id,
                distance: key.pos - rec.pos,
            });
        if ahead.is_some() {
            return Ok(ahead);
        }

        // Single-hop lookahead onto the downstream path.
        let path = &paths[rec.path];
        let lead = path.downstream().and_then(|ds| {
            let lane = self.lanes.get(ds)?;
            lane.iter().next().map(|(key, id)| LeadOccupant {
                agent: *id,
                distance: (path.length() - rec.pos) + key.pos,
            })
        });
        Ok(lead)
    }

    /// The number of occupants on the given path, for diagnostics.
    #[cfg(test)]
    pub fn occupants_on(&self, path: PathId) -> usize {
        self.lanes.get(path).map(|lane| lane.len()).unwrap_or(0)
    }
}
