//! Geometry primitives: rigid transforms and marker cloud aliases.

pub mod pose;

pub use pose::Pose;

/// A single observed marker position in the world frame.
pub type Point = nalgebra::Point3<f32>;

/// One captured frame of unlabeled markers. Order carries no meaning but is
/// preserved so indices stay stable within a single update.
pub type Cloud = Vec<Point>;

/// Centroid of a point set, or the origin for an empty set.
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::origin();
    }
    let mut sum = nalgebra::Vector3::zeros();
    for p in points {
        sum += p.coords;
    }
    Point::from(sum / points.len() as f32)
}
