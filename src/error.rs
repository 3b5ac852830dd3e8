//! Contract-violation errors surfaced by the tracker.
//!
//! Expected runtime failures (initialization retries, ICP divergence,
//! dynamics rejection) are reported through the warning sink and never
//! appear here.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(
        "rigid body `{name}` references marker configuration {index}, \
         but only {count} are defined"
    )]
    MarkerConfigurationOutOfRange {
        name: String,
        index: usize,
        count: usize,
    },

    #[error(
        "rigid body `{name}` references dynamics configuration {index}, \
         but only {count} are defined"
    )]
    DynamicsConfigurationOutOfRange {
        name: String,
        index: usize,
        count: usize,
    },

    #[error("marker configuration {index} has no markers")]
    EmptyMarkerConfiguration { index: usize },

    #[error("rigid body name `{name}` is not unique")]
    DuplicateBodyName { name: String },

    #[error(
        "update stamp {stamp:?} is not after rigid body `{name}`'s \
         last accepted stamp {last:?}"
    )]
    NonMonotonicStamp {
        name: String,
        stamp: Duration,
        last: Duration,
    },
}
