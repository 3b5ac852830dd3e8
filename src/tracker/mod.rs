//! Rigid-body tracker: configuration tables, body states, and the
//! per-frame update entry point.
//!
//! A `Tracker` consumes time-stamped clouds of unlabeled markers and
//! maintains a 6-DoF pose plus validity flag per configured body. The first
//! cloud is labeled by the initializer (yaw-sweep ICP with greedy marker
//! consumption); subsequent clouds go through per-body motion prediction,
//! constrained ICP, and the dynamics gate.

mod initializer;
mod updater;

pub mod rigid_body;
pub mod state;

use std::collections::HashSet;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::TrackerError;
use crate::geometry::Point;

pub use rigid_body::{DynamicsConfiguration, MarkerConfiguration, RigidBody};
pub use state::TrackingPhase;

/// Warning sink callback; receives plain human-readable strings.
pub type WarningCallback = Box<dyn Fn(&str) + Send>;

/// Multi-rigid-body marker tracker.
pub struct Tracker {
    pub(crate) marker_configurations: Vec<MarkerConfiguration>,
    pub(crate) dynamics_configurations: Vec<DynamicsConfiguration>,
    pub(crate) rigid_bodies: Vec<RigidBody>,
    pub(crate) phase: TrackingPhase,
    pub(crate) init_attempts: u32,
    log_warning: Option<WarningCallback>,
    epoch: Instant,
}

impl Tracker {
    /// Construct a tracker over fully populated configuration tables.
    ///
    /// Validates that every body references existing, non-empty
    /// configurations and that body names are unique; the tables are
    /// read-only afterwards.
    pub fn new(
        dynamics_configurations: Vec<DynamicsConfiguration>,
        marker_configurations: Vec<MarkerConfiguration>,
        rigid_bodies: Vec<RigidBody>,
    ) -> Result<Self, TrackerError> {
        let mut names = HashSet::new();
        for body in &rigid_bodies {
            if body.marker_configuration_idx >= marker_configurations.len() {
                return Err(TrackerError::MarkerConfigurationOutOfRange {
                    name: body.name.clone(),
                    index: body.marker_configuration_idx,
                    count: marker_configurations.len(),
                });
            }
            if body.dynamics_configuration_idx >= dynamics_configurations.len() {
                return Err(TrackerError::DynamicsConfigurationOutOfRange {
                    name: body.name.clone(),
                    index: body.dynamics_configuration_idx,
                    count: dynamics_configurations.len(),
                });
            }
            if marker_configurations[body.marker_configuration_idx].is_empty() {
                return Err(TrackerError::EmptyMarkerConfiguration {
                    index: body.marker_configuration_idx,
                });
            }
            if !names.insert(body.name.clone()) {
                return Err(TrackerError::DuplicateBodyName {
                    name: body.name.clone(),
                });
            }
        }

        Ok(Self {
            marker_configurations,
            dynamics_configurations,
            rigid_bodies,
            phase: TrackingPhase::default(),
            init_attempts: 0,
            log_warning: None,
            epoch: Instant::now(),
        })
    }

    /// Process a cloud stamped with the elapsed time since construction.
    pub fn update_now(&mut self, cloud: &[Point]) -> Result<(), TrackerError> {
        self.update(self.epoch.elapsed(), cloud)
    }

    /// Process one captured frame.
    ///
    /// Until the first successful initialization each call retries labeling
    /// the cloud and leaves body states untouched on failure. Afterwards
    /// every body is advanced independently; expected per-body failures are
    /// reported through the warning sink, and only caller contract
    /// violations (non-monotonic stamps) surface as errors.
    pub fn update(&mut self, stamp: Duration, cloud: &[Point]) -> Result<(), TrackerError> {
        if self.phase == TrackingPhase::Uninitialized {
            if self.initialize_bodies(cloud) {
                self.phase = TrackingPhase::Tracking;
            } else {
                self.warn(&format!(
                    "rigid body tracker initialization failed (attempt {}) - \
                     check that positions are correct, all markers are visible, \
                     and marker configurations match the tracked bodies",
                    self.init_attempts
                ));
                return Ok(());
            }
        }
        self.update_bodies(stamp, cloud)
    }

    /// Read-only view of the per-body states, in construction order.
    pub fn rigid_bodies(&self) -> &[RigidBody] {
        &self.rigid_bodies
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TrackingPhase {
        self.phase
    }

    /// Install the warning sink. Messages are delivered synchronously; the
    /// callback must not block or call back into the tracker.
    pub fn set_log_warning_callback(&mut self, callback: WarningCallback) {
        self.log_warning = Some(callback);
    }

    pub(crate) fn warn(&self, msg: &str) {
        warn!("{msg}");
        if let Some(cb) = &self.log_warning {
            cb(msg);
        }
    }
}
