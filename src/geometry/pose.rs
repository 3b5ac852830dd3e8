//! Rigid transform in 3D: rotation (unit quaternion) + translation.
//!
//! Poses are single precision to match the marker data coming off the
//! vision system. The quaternion representation keeps the rotation part
//! orthonormal by construction, so composing and inverting poses never
//! accumulates shear or scale.

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

use super::Point;

/// Rigid transformation: p' = R * p + t.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub rotation: UnitQuaternion<f32>,
    pub translation: Vector3<f32>,
}

impl Pose {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from rotation and translation parts.
    pub fn from_parts(rotation: UnitQuaternion<f32>, translation: Vector3<f32>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from a translation and a yaw angle about +Z.
    ///
    /// Used as the candidate transform during the initialization yaw sweep.
    pub fn from_translation_yaw(translation: Vector3<f32>, yaw: f32) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(0.0, 0.0, yaw),
            translation,
        }
    }

    /// Construct from a homogeneous 4x4 matrix of form [R | t; 0 | 1].
    ///
    /// The rotation block is re-orthonormalized through the quaternion
    /// conversion, so small numerical drift in the input is absorbed.
    pub fn from_matrix(mat: &Matrix4<f32>) -> Self {
        let rot_block = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let translation = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        let rot3 = Rotation3::from_matrix(&rot_block);
        Self {
            rotation: UnitQuaternion::from_rotation_matrix(&rot3),
            translation,
        }
    }

    /// Convert to a homogeneous 4x4 matrix.
    pub fn to_matrix(&self) -> Matrix4<f32> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        mat[(0, 3)] = self.translation.x;
        mat[(1, 3)] = self.translation.y;
        mat[(2, 3)] = self.translation.z;
        mat
    }

    /// Rotation part as a 3x3 matrix.
    pub fn rotation_matrix(&self) -> Matrix3<f32> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Inverse transformation: p = R^T * (p' - t).
    pub fn inverse(&self) -> Self {
        let rot_inv = self.rotation.inverse();
        Self {
            rotation: rot_inv,
            translation: -(rot_inv * self.translation),
        }
    }

    /// Compose two transforms: (self ∘ other)(p) = self(other(p)).
    pub fn compose(&self, other: &Pose) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// The same pose shifted by a world-frame translation delta.
    ///
    /// Equivalent to composing a pure translation on the left; used by the
    /// constant-velocity motion prediction.
    pub fn translated_by(&self, delta: Vector3<f32>) -> Self {
        Self {
            rotation: self.rotation,
            translation: self.translation + delta,
        }
    }

    /// Apply the transform to a single point.
    pub fn transform_point(&self, p: &Point) -> Point {
        Point::from(self.rotation * p.coords + self.translation)
    }

    /// Extract (roll, pitch, yaw) Euler angles, R = Rz(yaw) Ry(pitch) Rx(roll).
    ///
    /// Same convention the dynamics gate bounds are expressed in.
    pub fn euler_angles(&self) -> (f32, f32, f32) {
        self.rotation.euler_angles()
    }

    /// Magnitude of the rotation in radians.
    pub fn rotation_angle(&self) -> f32 {
        self.rotation.angle()
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_identity_leaves_points() {
        let p = Point::new(1.0, 2.0, 3.0);
        let q = Pose::identity().transform_point(&p);
        assert_relative_eq!(q, p, epsilon = 1e-7);
    }

    #[test]
    fn test_inverse_roundtrip() {
        let pose = Pose::from_parts(
            UnitQuaternion::from_euler_angles(0.1, -0.2, 0.7),
            Vector3::new(1.0, -2.0, 0.5),
        );
        let p = Point::new(0.3, 0.4, -0.1);
        let back = pose.inverse().transform_point(&pose.transform_point(&p));
        assert_relative_eq!(back, p, epsilon = 1e-5);
    }

    #[test]
    fn test_compose_matches_sequential_application() {
        let a = Pose::from_translation_yaw(Vector3::new(1.0, 0.0, 0.0), FRAC_PI_2);
        let b = Pose::from_parts(
            UnitQuaternion::from_euler_angles(0.2, 0.0, 0.0),
            Vector3::new(0.0, 1.0, 0.0),
        );
        let p = Point::new(0.5, -0.5, 0.25);
        let composed = a.compose(&b).transform_point(&p);
        let sequential = a.transform_point(&b.transform_point(&p));
        assert_relative_eq!(composed, sequential, epsilon = 1e-6);
    }

    #[test]
    fn test_matrix_roundtrip() {
        let pose = Pose::from_parts(
            UnitQuaternion::from_euler_angles(-0.4, 0.3, 1.2),
            Vector3::new(0.1, 0.2, 0.3),
        );
        let back = Pose::from_matrix(&pose.to_matrix());
        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-6);
        assert_relative_eq!(
            back.rotation.angle_to(&pose.rotation),
            0.0,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_euler_roundtrip() {
        let (roll, pitch, yaw) = (0.15_f32, -0.3_f32, 0.9_f32);
        let pose = Pose::from_parts(
            UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            Vector3::zeros(),
        );
        let (r, p, y) = pose.euler_angles();
        assert_relative_eq!(r, roll, epsilon = 1e-5);
        assert_relative_eq!(p, pitch, epsilon = 1e-5);
        assert_relative_eq!(y, yaw, epsilon = 1e-5);
    }

    #[test]
    fn test_yaw_constructor_rotates_about_z() {
        let pose = Pose::from_translation_yaw(Vector3::zeros(), FRAC_PI_2);
        let q = pose.transform_point(&Point::new(1.0, 0.0, 0.0));
        assert_relative_eq!(q, Point::new(0.0, 1.0, 0.0), epsilon = 1e-6);
    }

    #[test]
    fn test_rotation_part_is_orthonormal() {
        let pose = Pose::from_parts(
            UnitQuaternion::from_euler_angles(0.3, 0.8, -1.1),
            Vector3::new(4.0, 5.0, 6.0),
        );
        let r = pose.rotation_matrix();
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-5);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-5);
    }
}
