//! Multi-rigid-body motion capture tracking from unlabeled marker clouds.
//!
//! Feed time-stamped frames of 3D marker observations to a [`Tracker`] and
//! it maintains, for each configured rigid body, the current 6-DoF pose and
//! a per-frame validity flag. The first frame is labeled by a yaw-sweep ICP
//! initializer with greedy marker assignment; later frames run per-body
//! constant-velocity prediction, constrained ICP, and a kinematic
//! plausibility gate.

pub mod config;
pub mod error;
pub mod geometry;
pub mod icp;
pub mod io;
pub mod spatial;
pub mod tracker;

pub use error::TrackerError;
pub use geometry::{Cloud, Point, Pose};
pub use icp::{Icp, IcpResult};
pub use tracker::{
    DynamicsConfiguration, MarkerConfiguration, RigidBody, Tracker, TrackingPhase,
};
