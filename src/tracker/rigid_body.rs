//! Per-body state and the two configuration table entry types.

use std::time::Duration;

use nalgebra::Vector3;
use serde::Deserialize;

use crate::geometry::{Cloud, Pose};

/// A body's marker constellation, expressed in its local frame.
pub type MarkerConfiguration = Cloud;

/// Kinematic limits used by the dynamics gate, SI units (m, s, rad).
#[derive(Debug, Clone, Deserialize)]
pub struct DynamicsConfiguration {
    pub max_x_velocity: f32,
    pub max_y_velocity: f32,
    pub max_z_velocity: f32,
    pub max_roll_rate: f32,
    pub max_pitch_rate: f32,
    pub max_yaw_rate: f32,
    pub max_roll: f32,
    pub max_pitch: f32,
    /// Upper bound on the mean squared ICP correspondence distance.
    pub max_fitness_score: f32,
}

/// One tracked object: configuration references plus the mutable pose state.
///
/// State fields are written only by the tracker's initializer and frame
/// updater; external code reads through the accessors.
#[derive(Debug, Clone)]
pub struct RigidBody {
    pub(crate) marker_configuration_idx: usize,
    pub(crate) dynamics_configuration_idx: usize,
    pub(crate) name: String,
    pub(crate) initial_transformation: Pose,
    pub(crate) last_transformation: Pose,
    pub(crate) velocity: Vector3<f32>,
    pub(crate) last_valid_time: Option<Duration>,
    pub(crate) last_transformation_valid: bool,
}

impl RigidBody {
    /// A body at its nominal pose, not yet observed.
    pub fn new(
        marker_configuration_idx: usize,
        dynamics_configuration_idx: usize,
        initial_transformation: Pose,
        name: impl Into<String>,
    ) -> Self {
        Self {
            marker_configuration_idx,
            dynamics_configuration_idx,
            name: name.into(),
            last_transformation: initial_transformation.clone(),
            initial_transformation,
            velocity: Vector3::zeros(),
            last_valid_time: None,
            last_transformation_valid: false,
        }
    }

    /// The most recent accepted pose.
    pub fn transformation(&self) -> &Pose {
        &self.last_transformation
    }

    /// Current position (translation of the last accepted pose).
    pub fn center(&self) -> Vector3<f32> {
        self.last_transformation.translation
    }

    /// The pose hint the body was constructed with.
    pub fn initial_transformation(&self) -> &Pose {
        &self.initial_transformation
    }

    /// Nominal position used as the initialization search anchor.
    pub fn initial_center(&self) -> Vector3<f32> {
        self.initial_transformation.translation
    }

    /// Estimated translational velocity from the last accepted pose change.
    pub fn velocity(&self) -> Vector3<f32> {
        self.velocity
    }

    /// Whether the most recent update passed the dynamics gate.
    pub fn last_transformation_valid(&self) -> bool {
        self.last_transformation_valid
    }

    /// Stamp of the most recent accepted update, `None` before the first.
    pub fn last_valid_time(&self) -> Option<Duration> {
        self.last_valid_time
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
