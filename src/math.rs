//! Mathematical structs and functions.

use cgmath::{Point2, Vector2};

/// A 2D point
pub type Point2d = Point2<f64>;

/// A 2D vector
pub type Vector2d = Vector2<f64>;

/// Rotates a vector 90 degrees clockwise.
pub fn rot90(vec: Vector2d) -> Vector2d {
    Vector2d::new(-vec.y, vec.x)
}

/// Computes the heading angle of a vector in radians,
/// measured anti-clockwise from the positive x-axis.
pub fn heading_of(vec: Vector2d) -> f64 {
    vec.y.atan2(vec.x)
}
