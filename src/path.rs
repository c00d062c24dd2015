use crate::error::{SimError, SimResult};
use crate::lane_graph::{CenterSample, LaneGraph, SegmentKind};
use crate::{PathId, SegmentId};
use smallvec::SmallVec;

/// An immutable chain of lane segments with precomputed cumulative
/// arc-length offsets, shared read-only by the agents assigned to it.
pub struct LanePath {
    /// The segments of the path, in driving order.
    segments: SmallVec<[PathSegment; 8]>,
    /// The total length of the path in m.
    length: f64,
    /// The path that continues this one past its end, if any.
    downstream: Option<PathId>,
}

/// One segment of a [LanePath].
#[derive(Clone, Copy, Debug)]
pub(crate) struct PathSegment {
    /// The lane-graph segment.
    pub segment: SegmentId,
    /// Arc-length position of the segment's start along the path, in m.
    pub start_offset: f64,
}

impl LanePath {
    /// Assembles a path from a chain of lane-graph segments.
    pub(crate) fn new(chain: &[SegmentId], graph: &LaneGraph) -> SimResult<Self> {
        if chain.is_empty() {
            return Err(SimError::MalformedPath {
                reason: "path has no segments".to_owned(),
            });
        }

        let mut segments = SmallVec::new();
        let mut offset = 0.0;
        for id in chain {
            segments.push(PathSegment {
                segment: *id,
                start_offset: offset,
            });
            let end = offset + graph.segment(*id).length();
            if !(end > offset) {
                return Err(SimError::MalformedPath {
                    reason: "non-monotonic arc-length".to_owned(),
                });
            }
            offset = end;
        }

        Ok(Self {
            segments,
            length: offset,
            downstream: None,
        })
    }

    /// The total length of the path in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The path that continues this one past its end, if any.
    pub fn downstream(&self) -> Option<PathId> {
        self.downstream
    }

    pub(crate) fn set_downstream(&mut self, path: PathId) {
        self.downstream = Some(path);
    }

    /// The first lane-graph segment of the path.
    pub(crate) fn first_segment(&self) -> SegmentId {
        self.segments[0].segment
    }

    /// The last lane-graph segment of the path.
    pub(crate) fn last_segment(&self) -> SegmentId {
        self.segments[self.segments.len() - 1].segment
    }

    /// Finds the segment containing the given arc-length position,
    /// along with the position local to that segment.
    pub(crate) fn segment_at(&self, pos: f64) -> (&PathSegment, f64) {
        let idx = self
            .segments
            .partition_point(|seg| seg.start_offset <= pos)
            .clamp(1, self.segments.len());
        let seg = &self.segments[idx - 1];
        (seg, pos - seg.start_offset)
    }

    /// Samples the path's centre line at the given arc-length position,
    /// clamped to the path's bounds.
    pub(crate) fn sample(&self, pos: f64, graph: &LaneGraph) -> CenterSample {
        let (seg, local) = self.segment_at(pos.clamp(0.0, self.length));
        graph.segment(seg.segment).centerline().sample(local)
    }

    /// Projects a world-space point onto the path's centre line.
    ///
    /// # Returns
    /// A tuple containing the arc-length position of the closest point
    /// along the path, and the distance from the query point to it.
    pub(crate) fn project(&self, point: crate::math::Point2d, graph: &LaneGraph) -> (f64, f64) {
        let mut best = (0.0, f64::INFINITY);
        for seg in &self.segments {
            let (local, dist) = graph.segment(seg.segment).centerline().project(point);
            if dist < best.1 {
                best = (seg.start_offset + local, dist);
            }
        }
        best
    }

    /// Returns the stop lines on the path: the start offset and map ID
    /// of every lane-connector segment, in driving order.
    pub(crate) fn connector_stops<'a>(
        &'a self,
        graph: &'a LaneGraph,
    ) -> impl Iterator<Item = (f64, &'a str)> + 'a {
        self.segments.iter().filter_map(move |seg| {
            let segment = graph.segment(seg.segment);
            (segment.kind() == SegmentKind::LaneConnector)
                .then(|| (seg.start_offset, segment.map_id()))
        })
    }
}
