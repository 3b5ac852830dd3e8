//! First-frame labeling: assign each body a disjoint subset of observed
//! markers and compute its initial pose.
//!
//! Candidate markers are picked by k-NN around each body's nominal center,
//! screened by a deviation bound derived from the closest pair of nominal
//! positions, then fit with a sweep of yaw guesses refined by ICP. Accepted
//! bodies consume their markers so later bodies cannot claim them; bodies
//! are visited in construction order, so earlier bodies win ambiguous
//! markers.

use tracing::{debug, warn};

use crate::geometry::{centroid, Point, Pose};
use crate::icp::Icp;
use crate::spatial::SpatialIndex;

use super::Tracker;

/// Number of evenly spaced yaw guesses swept per body.
const N_YAW: usize = 20;

/// ICP iteration cap during the sweep.
const INIT_ICP_ITERATIONS: usize = 5;

/// Acceptance bound on each marker's nearest-neighbor squared distance:
/// (5 mm)^2.
const INIT_MAX_NEIGHBOR_DIST2: f32 = 2.5e-5;

impl Tracker {
    /// Attempt to label `cloud`. Returns true only if every body's fit was
    /// accepted. Bodies whose fit is accepted keep their new pose even when
    /// the overall attempt fails, so the next attempt starts closer.
    pub(crate) fn initialize_bodies(&mut self, cloud: &[Point]) -> bool {
        self.init_attempts += 1;

        let required: usize = self
            .rigid_bodies
            .iter()
            .map(|b| self.marker_configurations[b.marker_configuration_idx].len())
            .sum();
        if cloud.len() < required {
            warn!(
                observed = cloud.len(),
                required, "not enough markers in the cloud to label every body"
            );
            return false;
        }

        // The deviation bound keeps a body from grabbing markers that sit
        // closer to another body's nominal position.
        let mut closest_pair = f32::INFINITY;
        for (i, a) in self.rigid_bodies.iter().enumerate() {
            for b in &self.rigid_bodies[i + 1..] {
                closest_pair = closest_pair.min((a.center() - b.center()).norm());
            }
        }
        let max_deviation = closest_pair / 3.0;
        debug!(max_deviation, "limiting candidate distance from nominal positions");

        // The initializer owns a consumable copy of the frame.
        let mut index = SpatialIndex::build(cloud);
        let mut icp = Icp::new();
        icp.set_max_iterations(INIT_ICP_ITERATIONS);
        icp.set_target(&index.surviving_points());

        let mut all_fits_good = true;
        for i in 0..self.rigid_bodies.len() {
            let body = &self.rigid_bodies[i];
            let name = body.name.clone();
            let nominal = body.center();
            let markers = &self.marker_configurations[body.marker_configuration_idx];
            let k = markers.len();

            let neighbors = index.k_nearest(&Point::from(nominal), k);
            if neighbors.len() < k {
                warn!(body = %name, "not enough unclaimed markers near nominal position");
                all_fits_good = false;
                continue;
            }

            let candidates: Vec<Point> =
                neighbors.iter().map(|&(idx, _)| *index.point(idx)).collect();
            let candidate_center = centroid(&candidates);
            let deviation = (candidate_center.coords - nominal).norm();
            if deviation > max_deviation {
                warn!(
                    body = %name,
                    deviation,
                    max_deviation,
                    "nearest markers are centered too far from the nominal position"
                );
                all_fits_good = false;
                continue;
            }

            // Sweep yaw guesses about the candidate centroid and keep the
            // best fit by fitness.
            icp.set_source(markers);
            let mut best: Option<(f32, Pose)> = None;
            for step in 0..N_YAW {
                let yaw = step as f32 * (2.0 * std::f32::consts::PI / N_YAW as f32);
                let guess = Pose::from_translation_yaw(candidate_center.coords, yaw);
                let result = icp.align(&guess);
                if !result.converged {
                    continue;
                }
                if best.as_ref().map_or(true, |(err, _)| result.fitness < *err) {
                    best = Some((result.fitness, result.transform));
                }
            }
            let Some((_, best_transform)) = best else {
                warn!(body = %name, "no yaw guess produced a usable alignment");
                all_fits_good = false;
                continue;
            };

            // Accept only if every model marker lands within 5 mm of an
            // unclaimed observed marker.
            let mut claimed = Vec::with_capacity(k);
            let mut fit_good = true;
            for (m, marker) in markers.iter().enumerate() {
                let projected = best_transform.transform_point(marker);
                match index.nearest(&projected) {
                    Some((idx, d2)) if d2 <= INIT_MAX_NEIGHBOR_DIST2 => claimed.push(idx),
                    Some((_, d2)) => {
                        warn!(
                            body = %name,
                            marker = m,
                            distance_mm = d2.sqrt() * 1000.0,
                            "marker too far from its nearest observation"
                        );
                        fit_good = false;
                    }
                    None => {
                        fit_good = false;
                    }
                }
            }

            if fit_good {
                self.rigid_bodies[i].last_transformation = best_transform;
                index.remove_points(&claimed);
                icp.set_target(&index.surviving_points());
            }
            all_fits_good = all_fits_good && fit_good;
        }

        all_fits_good
    }
}
