//! YAML tracker configuration for the playback tooling.
//!
//! The core tracker is constructed programmatically; this module gives the
//! binary a declarative way to describe the dynamics table, the marker
//! constellations, and the tracked bodies with their nominal poses.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::geometry::{Point, Pose};
use crate::tracker::{DynamicsConfiguration, MarkerConfiguration, RigidBody, Tracker};

/// Top-level configuration file layout.
#[derive(Debug, Deserialize)]
pub struct TrackerConfig {
    pub dynamics_configurations: Vec<DynamicsConfiguration>,
    /// Marker constellations as lists of [x, y, z] body-frame positions.
    pub marker_configurations: Vec<Vec<[f32; 3]>>,
    pub rigid_bodies: Vec<RigidBodySpec>,
}

/// One tracked body entry.
#[derive(Debug, Deserialize)]
pub struct RigidBodySpec {
    pub name: String,
    pub marker_configuration: usize,
    pub dynamics_configuration: usize,
    /// Nominal world position used as the initialization anchor.
    pub initial_position: [f32; 3],
    /// Nominal heading, radians about +Z.
    #[serde(default)]
    pub initial_yaw: f32,
}

impl TrackerConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        serde_yaml::from_reader(file)
            .with_context(|| format!("failed to parse {}", path.as_ref().display()))
    }

    /// Materialize the configured tracker.
    pub fn build_tracker(&self) -> Result<Tracker> {
        let markers: Vec<MarkerConfiguration> = self
            .marker_configurations
            .iter()
            .map(|cfg| cfg.iter().map(|&[x, y, z]| Point::new(x, y, z)).collect())
            .collect();

        let bodies = self
            .rigid_bodies
            .iter()
            .map(|spec| {
                let pose = Pose::from_translation_yaw(
                    nalgebra::Vector3::new(
                        spec.initial_position[0],
                        spec.initial_position[1],
                        spec.initial_position[2],
                    ),
                    spec.initial_yaw,
                );
                RigidBody::new(
                    spec.marker_configuration,
                    spec.dynamics_configuration,
                    pose,
                    spec.name.clone(),
                )
            })
            .collect();

        let tracker = Tracker::new(self.dynamics_configurations.clone(), markers, bodies)
            .context("configuration does not describe a valid tracker")?;
        Ok(tracker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const FIXTURE: &str = r#"
dynamics_configurations:
  - max_x_velocity: 2.0
    max_y_velocity: 2.0
    max_z_velocity: 2.0
    max_roll_rate: 10.0
    max_pitch_rate: 10.0
    max_yaw_rate: 10.0
    max_roll: 1.5
    max_pitch: 1.5
    max_fitness_score: 0.0001
marker_configurations:
  - [[0.0, 0.0, 0.0], [0.1, 0.0, 0.0], [0.0, 0.1, 0.0]]
rigid_bodies:
  - name: probe
    marker_configuration: 0
    dynamics_configuration: 0
    initial_position: [0.5, -0.25, 1.0]
    initial_yaw: 1.5707964
"#;

    #[test]
    fn test_parse_and_build() {
        let config: TrackerConfig = serde_yaml::from_str(FIXTURE).unwrap();
        assert_eq!(config.dynamics_configurations.len(), 1);
        assert_eq!(config.marker_configurations[0].len(), 3);

        let tracker = config.build_tracker().unwrap();
        let body = &tracker.rigid_bodies()[0];
        assert_eq!(body.name(), "probe");
        assert_relative_eq!(body.initial_center().x, 0.5, epsilon = 1e-6);
        let (_, _, yaw) = body.initial_transformation().euler_angles();
        assert_relative_eq!(yaw, std::f32::consts::FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn test_bad_reference_is_rejected_at_build() {
        let mut config: TrackerConfig = serde_yaml::from_str(FIXTURE).unwrap();
        config.rigid_bodies[0].marker_configuration = 7;
        assert!(config.build_tracker().is_err());
    }
}
