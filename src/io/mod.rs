//! File formats consumed and produced by the tracking tools.

pub mod cloudlog;

pub use cloudlog::{CloudLog, CloudLogWriter};
