use crate::error::{SimError, SimResult};
use crate::math::{Point2d, Vector2d};
use crate::util::Interval;
use crate::{SegmentId, SegmentSet};
use cgmath::prelude::*;
use itertools::Itertools;

/// The kind of a lane-graph segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SegmentKind {
    /// A stretch of lane within a road block.
    Lane,
    /// A connector joining two lanes across an intersection.
    /// Traffic lights govern these.
    LaneConnector,
}

/// The attributes of a lane segment.
pub struct SegmentAttributes<'a> {
    /// The kind of the segment.
    pub kind: SegmentKind,
    /// The identifier of the segment in the source map.
    /// Traffic light state is keyed on this.
    pub map_id: &'a str,
    /// Waypoints defining the centre line of the segment.
    pub waypoints: &'a [Point2d],
    /// The speed limit in m/s.
    pub speed_limit: f64,
}

/// A single lane or lane connector in the lane graph.
#[derive(Clone)]
pub struct LaneSegment {
    /// The segment ID.
    id: SegmentId,
    /// The kind of the segment.
    kind: SegmentKind,
    /// The identifier of the segment in the source map.
    map_id: String,
    /// The geometry of the segment.
    centerline: Centerline,
    /// Speed limit in m/s.
    speed_limit: f64,
    /// The segments that succeed this one.
    successors: Vec<SegmentId>,
}

impl LaneSegment {
    /// Gets the segment's ID.
    pub fn id(&self) -> SegmentId {
        self.id
    }

    /// Gets the kind of the segment.
    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    /// Gets the identifier of the segment in the source map.
    pub fn map_id(&self) -> &str {
        &self.map_id
    }

    /// Gets the centre line of the segment.
    pub fn centerline(&self) -> &Centerline {
        &self.centerline
    }

    /// Gets the length of the segment in m.
    pub fn length(&self) -> f64 {
        self.centerline.length()
    }

    /// Gets the speed limit in m/s.
    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    /// Gets the segments that succeed this one.
    pub fn successors(&self) -> &[SegmentId] {
        &self.successors
    }
}

/// The lane and lane-connector segments of a map,
/// exposed with arc-length parameterized centre lines.
#[derive(Clone, Default)]
pub struct LaneGraph {
    segments: SegmentSet,
}

impl LaneGraph {
    /// Creates an empty lane graph.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a segment to the graph.
    pub fn add_segment(&mut self, attribs: &SegmentAttributes) -> SimResult<SegmentId> {
        let centerline = Centerline::new(attribs.waypoints)?;
        Ok(self.segments.insert_with_key(|id| LaneSegment {
            id,
            kind: attribs.kind,
            map_id: attribs.map_id.to_owned(),
            centerline,
            speed_limit: attribs.speed_limit,
            successors: vec![],
        }))
    }

    /// Specifies that the end of the `from` segment connects to the start of the `to` segment.
    pub fn connect(&mut self, from: SegmentId, to: SegmentId) {
        self.segments[from].successors.push(to);
    }

    /// Gets a reference to the segment with the given ID.
    pub fn segment(&self, id: SegmentId) -> &LaneSegment {
        &self.segments[id]
    }

    /// Returns an iterator over all the segments in the graph.
    pub fn iter_segments(&self) -> impl Iterator<Item = &LaneSegment> {
        self.segments.values()
    }
}

/// An arc-length parameterized polyline centre line.
#[derive(Clone)]
pub struct Centerline {
    /// The waypoints of the polyline.
    points: Vec<Point2d>,
    /// Cumulative arc length at each waypoint, starting at zero.
    offsets: Vec<f64>,
    /// The total length of the polyline in m.
    length: f64,
}

/// The result of sampling a [Centerline].
#[derive(Clone, Copy, Debug)]
pub struct CenterSample {
    /// The sampled position.
    pub pos: Point2d,
    /// The tangent unit vector of the centre line.
    pub tan: Vector2d,
}

impl Centerline {
    /// Creates a new centre line from the given waypoints.
    /// Consecutive duplicate waypoints are dropped.
    pub fn new(waypoints: &[Point2d]) -> SimResult<Self> {
        let mut points: Vec<Point2d> = Vec::with_capacity(waypoints.len());
        for point in waypoints {
            if points.last() != Some(point) {
                points.push(*point);
            }
        }
        if points.len() < 2 {
            return Err(SimError::MalformedPath {
                reason: "centre line needs at least two distinct waypoints".to_owned(),
            });
        }

        let mut offsets = Vec::with_capacity(points.len());
        offsets.push(0.0);
        let mut length = 0.0;
        for (a, b) in points.iter().tuple_windows() {
            length += (b - a).magnitude();
            offsets.push(length);
        }

        Ok(Self {
            points,
            offsets,
            length,
        })
    }

    /// The length of the centre line in m.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// The interval of valid arc-length positions.
    pub fn bounds(&self) -> Interval<f64> {
        Interval::new(0.0, self.length)
    }

    /// Samples the centre line at the given arc-length position,
    /// clamped to the line's bounds.
    pub fn sample(&self, pos: f64) -> CenterSample {
        let pos = pos.clamp(0.0, self.length);
        let idx = self
            .offsets
            .partition_point(|off| *off <= pos)
            .clamp(1, self.points.len() - 1);
        let (a, b) = (self.points[idx - 1], self.points[idx]);
        let tan = (b - a).normalize();
        CenterSample {
            pos: a + tan * (pos - self.offsets[idx - 1]),
            tan,
        }
    }

    /// Projects a point onto the centre line.
    ///
    /// # Returns
    /// A tuple containing the arc-length position of the closest point
    /// on the line, and the distance from the query point to it.
    pub fn project(&self, point: Point2d) -> (f64, f64) {
        let mut best = (0.0, f64::INFINITY);
        for (idx, (a, b)) in self.points.iter().tuple_windows().enumerate() {
            let edge = b - a;
            let t = ((point - a).dot(edge) / edge.magnitude2()).clamp(0.0, 1.0);
            let closest = a + edge * t;
            let dist = (point - closest).magnitude();
            if dist < best.1 {
                best = (self.offsets[idx] + t * edge.magnitude(), dist);
            }
        }
        best
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn straight() -> Centerline {
        Centerline::new(&[
            Point2d::new(0.0, 0.0),
            Point2d::new(50.0, 0.0),
            Point2d::new(50.0, 30.0),
        ])
        .unwrap()
    }

    #[test]
    fn cumulative_length() {
        let line = straight();
        assert_approx_eq!(line.length(), 80.0);
        assert_approx_eq!(line.bounds().length(), 80.0);
        assert!(line.bounds().contains(40.0));
        assert!(!line.bounds().contains(81.0));
    }

    #[test]
    fn sample_is_arc_length_parameterized() {
        let line = straight();
        let s = line.sample(10.0);
        assert_approx_eq!(s.pos.x, 10.0);
        assert_approx_eq!(s.pos.y, 0.0);
        assert_approx_eq!(s.tan.x, 1.0);

        let s = line.sample(60.0);
        assert_approx_eq!(s.pos.x, 50.0);
        assert_approx_eq!(s.pos.y, 10.0);
        assert_approx_eq!(s.tan.y, 1.0);

        // Out-of-bounds samples clamp to the ends.
        let s = line.sample(1000.0);
        assert_approx_eq!(s.pos.y, 30.0);
    }

    #[test]
    fn project_onto_line() {
        let line = straight();
        let (pos, dist) = line.project(Point2d::new(20.0, 3.0));
        assert_approx_eq!(pos, 20.0);
        assert_approx_eq!(dist, 3.0);

        let (pos, dist) = line.project(Point2d::new(48.0, 25.0));
        assert_approx_eq!(pos, 75.0);
        assert_approx_eq!(dist, 2.0);
    }

    #[test]
    fn degenerate_waypoints_are_rejected() {
        let p = Point2d::new(1.0, 1.0);
        assert!(Centerline::new(&[p, p, p]).is_err());
        assert!(Centerline::new(&[p]).is_err());
    }
}
