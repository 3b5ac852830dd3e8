use anyhow::{bail, Result};
use tracing::{debug, info};

use rigidbody_tracker::config::TrackerConfig;
use rigidbody_tracker::io::CloudLog;
use std::time::Duration;

fn main() -> Result<()> {
    // Initialize tracing subscriber with environment filter
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let (Some(config_path), Some(log_path)) = (args.next(), args.next()) else {
        bail!("usage: rigidbody-tracker <config.yaml> <input.log> [fitted.log]");
    };
    let fitted_path = args.next();

    let config = TrackerConfig::load(&config_path)?;
    let mut tracker = config.build_tracker()?;
    let log = CloudLog::load(&log_path)?;
    info!(
        "Loaded {} frames, tracking {} rigid bodies",
        log.len(),
        tracker.rigid_bodies().len()
    );

    if let Some(fitted_path) = fitted_path {
        let fitted = log.reproject(&mut tracker)?;
        let mut out = std::fs::File::create(&fitted_path)?;
        fitted.write_to(&mut out)?;
        info!("Wrote fitted marker log to {fitted_path}");
        return Ok(());
    }

    let mut valid_frames = vec![0usize; tracker.rigid_bodies().len()];
    for (millis, cloud) in log.frames() {
        tracker.update(Duration::from_millis(*millis as u64), cloud)?;
        for (i, body) in tracker.rigid_bodies().iter().enumerate() {
            if body.last_transformation_valid() {
                valid_frames[i] += 1;
                let t = body.transformation().translation;
                debug!(
                    "t={millis}ms {} at ({:.3}, {:.3}, {:.3})",
                    body.name(),
                    t.x,
                    t.y,
                    t.z
                );
            }
        }
    }

    for (i, body) in tracker.rigid_bodies().iter().enumerate() {
        info!(
            "{}: {}/{} frames valid",
            body.name(),
            valid_frames[i],
            log.len()
        );
    }

    Ok(())
}
