//! Per-frame body state advancement: constant-velocity prediction,
//! constrained ICP alignment, dynamics gating, and state commit.

use std::time::Duration;

use crate::error::TrackerError;
use crate::geometry::Point;
use crate::icp::Icp;

use super::Tracker;

/// ICP iteration cap on the per-frame path.
const UPDATE_ICP_ITERATIONS: usize = 5;

impl Tracker {
    /// Advance every body against the new frame.
    ///
    /// Bodies are independent after initialization: a body whose alignment
    /// fails or is rejected keeps its previous state and simply stays
    /// invalid for this frame.
    pub(crate) fn update_bodies(
        &mut self,
        stamp: Duration,
        cloud: &[Point],
    ) -> Result<(), TrackerError> {
        let mut icp = Icp::new();
        icp.set_max_iterations(UPDATE_ICP_ITERATIONS);
        icp.set_target(cloud);

        for i in 0..self.rigid_bodies.len() {
            self.rigid_bodies[i].last_transformation_valid = false;

            let body = &self.rigid_bodies[i];
            let name = body.name.clone();
            let last = body.last_transformation.clone();
            let velocity = body.velocity;
            let dynamics =
                self.dynamics_configurations[body.dynamics_configuration_idx].clone();

            // A body with no accepted pose yet gets an unbounded search
            // radius and zero rates, matching a first observation after an
            // arbitrarily long wait.
            let dt = match body.last_valid_time {
                Some(prev) => {
                    let elapsed = stamp.checked_sub(prev).ok_or_else(|| {
                        TrackerError::NonMonotonicStamp {
                            name: name.clone(),
                            stamp,
                            last: prev,
                        }
                    })?;
                    let dt = elapsed.as_secs_f32();
                    if dt <= 0.0 {
                        return Err(TrackerError::NonMonotonicStamp {
                            name,
                            stamp,
                            last: prev,
                        });
                    }
                    dt
                }
                None => f32::INFINITY,
            };

            // Couple the correspondence radius to plausible motion since the
            // last accepted pose.
            icp.set_max_correspondence_distance(dynamics.max_x_velocity * dt);
            icp.set_source(&self.marker_configurations[body.marker_configuration_idx]);

            let predicted = if dt.is_finite() {
                last.translated_by(velocity * dt)
            } else {
                last.clone()
            };

            let aligned = icp.align(&predicted);
            if !aligned.converged {
                self.warn(&format!("ICP did not converge for rigid body `{name}`"));
                continue;
            }

            let new = &aligned.transform;
            let (roll, pitch, yaw) = new.euler_angles();
            let (last_roll, last_pitch, last_yaw) = last.euler_angles();

            let vx = (new.translation.x - last.translation.x) / dt;
            let vy = (new.translation.y - last.translation.y) / dt;
            let vz = (new.translation.z - last.translation.z) / dt;
            let wroll = (roll - last_roll) / dt;
            let wpitch = (pitch - last_pitch) / dt;
            let wyaw = (yaw - last_yaw) / dt;

            let mut failures = Vec::new();
            if vx.abs() >= dynamics.max_x_velocity {
                failures.push(format!("vx: {vx} >= {}", dynamics.max_x_velocity));
            }
            if vy.abs() >= dynamics.max_y_velocity {
                failures.push(format!("vy: {vy} >= {}", dynamics.max_y_velocity));
            }
            if vz.abs() >= dynamics.max_z_velocity {
                failures.push(format!("vz: {vz} >= {}", dynamics.max_z_velocity));
            }
            if wroll.abs() >= dynamics.max_roll_rate {
                failures.push(format!("wroll: {wroll} >= {}", dynamics.max_roll_rate));
            }
            if wpitch.abs() >= dynamics.max_pitch_rate {
                failures.push(format!("wpitch: {wpitch} >= {}", dynamics.max_pitch_rate));
            }
            if wyaw.abs() >= dynamics.max_yaw_rate {
                failures.push(format!("wyaw: {wyaw} >= {}", dynamics.max_yaw_rate));
            }
            if roll.abs() >= dynamics.max_roll {
                failures.push(format!("roll: {roll} >= {}", dynamics.max_roll));
            }
            if pitch.abs() >= dynamics.max_pitch {
                failures.push(format!("pitch: {pitch} >= {}", dynamics.max_pitch));
            }
            if aligned.fitness >= dynamics.max_fitness_score {
                failures.push(format!(
                    "fitness: {} >= {}",
                    aligned.fitness, dynamics.max_fitness_score
                ));
            }

            if failures.is_empty() {
                let body = &mut self.rigid_bodies[i];
                body.velocity = (new.translation - last.translation) / dt;
                body.last_transformation = aligned.transform;
                body.last_valid_time = Some(stamp);
                body.last_transformation_valid = true;
            } else {
                self.warn(&format!(
                    "dynamics check failed for rigid body `{name}`\n{}",
                    failures.join("\n")
                ));
            }
        }

        Ok(())
    }
}
