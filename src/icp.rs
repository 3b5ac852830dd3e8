//! Iterative Closest Point registration for marker constellations.
//!
//! Aligns a small source cloud (a body's marker configuration) against an
//! observed frame by alternating nearest-neighbor correspondence with a
//! closed-form SVD rigid fit. The correspondence search radius and the
//! iteration budget are caller-controlled; the tracker couples the radius
//! to the body's plausible motion since its last accepted pose.

use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion};

use crate::geometry::{Cloud, Point, Pose};

/// A rigid fit needs at least three non-degenerate correspondences.
const MIN_CORRESPONDENCES: usize = 3;

/// Outcome of one alignment.
#[derive(Debug, Clone)]
pub struct IcpResult {
    /// The refined source-to-target transform.
    pub transform: Pose,
    /// False when the correspondence set collapsed below the minimum;
    /// exhausting the iteration budget with valid correspondences still
    /// counts as converged.
    pub converged: bool,
    /// Mean squared correspondence distance under the final transform,
    /// `f32::MAX` when nothing matched.
    pub fitness: f32,
}

/// Point-to-point ICP engine.
pub struct Icp {
    source: Cloud,
    target: Cloud,
    target_tree: KdTree<f32, 3>,
    max_correspondence_distance: f32,
    max_iterations: usize,
    translation_epsilon: f32,
    rotation_epsilon: f32,
}

impl Icp {
    pub fn new() -> Self {
        Self {
            source: Cloud::new(),
            target: Cloud::new(),
            target_tree: KdTree::new(),
            max_correspondence_distance: f32::INFINITY,
            max_iterations: 5,
            translation_epsilon: 1e-6,
            rotation_epsilon: 1e-6,
        }
    }

    /// Set the observed frame to align against. Builds the search tree.
    pub fn set_target(&mut self, target: &[Point]) {
        self.target = target.to_vec();
        let mut tree: KdTree<f32, 3> = KdTree::new();
        for (i, p) in target.iter().enumerate() {
            tree.add(&[p.x, p.y, p.z], i as u64);
        }
        self.target_tree = tree;
    }

    /// Set the model cloud to be transformed onto the target.
    pub fn set_source(&mut self, source: &[Point]) {
        self.source = source.to_vec();
    }

    /// Reject correspondences farther apart than `distance` (meters).
    pub fn set_max_correspondence_distance(&mut self, distance: f32) {
        self.max_correspondence_distance = distance;
    }

    /// Cap the number of correspondence/fit rounds.
    pub fn set_max_iterations(&mut self, iterations: usize) {
        self.max_iterations = iterations;
    }

    /// Refine `initial_guess` until the update stalls or the budget runs out.
    pub fn align(&self, initial_guess: &Pose) -> IcpResult {
        let mut current = initial_guess.clone();

        if self.source.len() < MIN_CORRESPONDENCES || self.target.is_empty() {
            return IcpResult {
                transform: current,
                converged: false,
                fitness: f32::MAX,
            };
        }

        let max_d2 = if self.max_correspondence_distance.is_finite() {
            self.max_correspondence_distance * self.max_correspondence_distance
        } else {
            f32::INFINITY
        };

        for _ in 0..self.max_iterations {
            let (src, tgt) = self.correspondences(&current, max_d2);
            if src.len() < MIN_CORRESPONDENCES {
                return IcpResult {
                    transform: current,
                    converged: false,
                    fitness: f32::MAX,
                };
            }

            let Some(delta) = fit_rigid(&src, &tgt) else {
                return IcpResult {
                    transform: current,
                    converged: false,
                    fitness: f32::MAX,
                };
            };
            current = delta.compose(&current);

            if delta.translation.norm() < self.translation_epsilon
                && delta.rotation_angle() < self.rotation_epsilon
            {
                break;
            }
        }

        let (src, tgt) = self.correspondences(&current, max_d2);
        if src.len() < MIN_CORRESPONDENCES {
            return IcpResult {
                transform: current,
                converged: false,
                fitness: f32::MAX,
            };
        }
        let fitness = src
            .iter()
            .zip(&tgt)
            .map(|(s, t)| (s.coords - t.coords).norm_squared())
            .sum::<f32>()
            / src.len() as f32;

        IcpResult {
            transform: current,
            converged: true,
            fitness,
        }
    }

    /// Transformed source points paired with their nearest in-range targets.
    fn correspondences(&self, transform: &Pose, max_d2: f32) -> (Cloud, Cloud) {
        let mut src = Vec::with_capacity(self.source.len());
        let mut tgt = Vec::with_capacity(self.source.len());
        for p in &self.source {
            let q = transform.transform_point(p);
            let nn = self.target_tree.nearest_one::<SquaredEuclidean>(&[q.x, q.y, q.z]);
            if nn.distance <= max_d2 {
                src.push(q);
                tgt.push(self.target[nn.item as usize]);
            }
        }
        (src, tgt)
    }
}

impl Default for Icp {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed-form rigid fit mapping `src` onto `tgt` (Kabsch, paired points).
///
/// Returns `None` when the SVD fails to produce rotation factors.
fn fit_rigid(src: &[Point], tgt: &[Point]) -> Option<Pose> {
    let n = src.len() as f32;
    let src_centroid = src.iter().map(|p| p.coords).sum::<nalgebra::Vector3<f32>>() / n;
    let tgt_centroid = tgt.iter().map(|p| p.coords).sum::<nalgebra::Vector3<f32>>() / n;

    let mut h = Matrix3::zeros();
    for (s, t) in src.iter().zip(tgt) {
        h += (s.coords - src_centroid) * (t.coords - tgt_centroid).transpose();
    }

    let svd = h.svd(true, true);
    let (u, v_t) = (svd.u?, svd.v_t?);

    let mut rotation = v_t.transpose() * u.transpose();
    if rotation.determinant() < 0.0 {
        // Reflection case: flip the axis of least significance.
        let mut v = v_t.transpose();
        v.column_mut(2).neg_mut();
        rotation = v * u.transpose();
    }

    let translation = tgt_centroid - rotation * src_centroid;
    let rot3 = Rotation3::from_matrix_unchecked(rotation);
    Some(Pose::from_parts(
        UnitQuaternion::from_rotation_matrix(&rot3),
        translation,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::f32::consts::FRAC_PI_4;

    /// Yaw-asymmetric constellation so rotations are observable.
    fn l_shape() -> Cloud {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.1, 0.0, 0.0),
            Point::new(0.2, 0.0, 0.0),
            Point::new(0.0, 0.15, 0.0),
            Point::new(0.0, 0.0, 0.05),
        ]
    }

    fn apply(pose: &Pose, cloud: &[Point]) -> Cloud {
        cloud.iter().map(|p| pose.transform_point(p)).collect()
    }

    #[test]
    fn test_identity_alignment() {
        let cloud = l_shape();
        let mut icp = Icp::new();
        icp.set_source(&cloud);
        icp.set_target(&cloud);

        let result = icp.align(&Pose::identity());
        assert!(result.converged);
        assert!(result.fitness < 1e-10);
        assert_relative_eq!(result.transform.translation.norm(), 0.0, epsilon = 1e-5);
        assert!(result.transform.rotation_angle() < 1e-4);
    }

    #[test]
    fn test_recovers_small_translation() {
        let source = l_shape();
        let truth = Pose::from_parts(
            UnitQuaternion::identity(),
            Vector3::new(0.02, -0.01, 0.015),
        );
        let target = apply(&truth, &source);

        let mut icp = Icp::new();
        icp.set_source(&source);
        icp.set_target(&target);

        let result = icp.align(&Pose::identity());
        assert!(result.converged);
        assert_relative_eq!(
            result.transform.translation,
            truth.translation,
            epsilon = 1e-4
        );
        assert!(result.fitness < 1e-8);
    }

    #[test]
    fn test_recovers_yaw_with_guess() {
        let source = l_shape();
        let truth = Pose::from_translation_yaw(Vector3::new(0.01, 0.0, 0.0), FRAC_PI_4);
        let target = apply(&truth, &source);

        let mut icp = Icp::new();
        icp.set_source(&source);
        icp.set_target(&target);
        icp.set_max_iterations(20);

        // Guess within the basin of attraction.
        let guess = Pose::from_translation_yaw(Vector3::zeros(), FRAC_PI_4 - 0.1);
        let result = icp.align(&guess);
        assert!(result.converged);
        let (_, _, yaw) = result.transform.euler_angles();
        assert_relative_eq!(yaw, FRAC_PI_4, epsilon = 1e-3);
        assert!(result.fitness < 1e-7);
    }

    #[test]
    fn test_out_of_reach_target_does_not_converge() {
        let source = l_shape();
        let far = Pose::from_parts(UnitQuaternion::identity(), Vector3::new(5.0, 0.0, 0.0));
        let target = apply(&far, &source);

        let mut icp = Icp::new();
        icp.set_source(&source);
        icp.set_target(&target);
        icp.set_max_correspondence_distance(0.05);

        let result = icp.align(&Pose::identity());
        assert!(!result.converged);
        assert_eq!(result.fitness, f32::MAX);
    }

    #[test]
    fn test_empty_target_fails() {
        let mut icp = Icp::new();
        icp.set_source(&l_shape());
        icp.set_target(&[]);
        let result = icp.align(&Pose::identity());
        assert!(!result.converged);
    }

    #[test]
    fn test_fit_rigid_exact_pairs() {
        let src = l_shape();
        let truth = Pose::from_parts(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.5),
            Vector3::new(0.3, 0.1, -0.2),
        );
        let tgt = apply(&truth, &src);

        let fitted = fit_rigid(&src, &tgt).unwrap();
        assert_relative_eq!(fitted.translation, truth.translation, epsilon = 1e-4);
        assert!(fitted.rotation.angle_to(&truth.rotation) < 1e-4);
    }
}
