//! Binary point-cloud log: writer, reader, playback, and reprojection.
//!
//! The format is an endless repetition of little-endian records with no
//! framing header:
//!
//! ```text
//! timestamp_ms : u32
//! point_count  : u32
//! points       : point_count x { x: f32, y: f32, z: f32 }
//! ```
//!
//! End-of-file on a record boundary is a clean stream termination; a
//! truncated record is an error.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::geometry::{Cloud, Point};
use crate::tracker::Tracker;

/// Appends cloud records to a byte sink.
pub struct CloudLogWriter<W: Write> {
    out: W,
    start: Option<Instant>,
}

impl CloudLogWriter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("failed to create {}", path.as_ref().display()))?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CloudLogWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, start: None }
    }

    /// Append a cloud stamped with the elapsed milliseconds since the first
    /// call.
    pub fn log_now(&mut self, cloud: &[Point]) -> Result<()> {
        let start = *self.start.get_or_insert_with(Instant::now);
        self.log(start.elapsed().as_millis() as u32, cloud)
    }

    /// Append one record.
    pub fn log(&mut self, millis: u32, cloud: &[Point]) -> Result<()> {
        self.out.write_u32::<LittleEndian>(millis)?;
        self.out.write_u32::<LittleEndian>(cloud.len() as u32)?;
        for p in cloud {
            self.out.write_f32::<LittleEndian>(p.x)?;
            self.out.write_f32::<LittleEndian>(p.y)?;
            self.out.write_f32::<LittleEndian>(p.z)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// A fully loaded cloud log, for faster-than-real-time playback.
#[derive(Debug, Clone, Default)]
pub struct CloudLog {
    frames: Vec<(u32, Cloud)>,
}

impl CloudLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path.as_ref())
            .with_context(|| format!("failed to open {}", path.as_ref().display()))?;
        Self::read_from(BufReader::new(file))
    }

    /// Read records until a clean end of stream.
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut frames = Vec::new();
        loop {
            // The timestamp is the record boundary: zero bytes here is a
            // clean termination, a short read is a truncated log.
            let mut stamp_buf = [0u8; 4];
            let n = read_until_full(&mut reader, &mut stamp_buf)?;
            if n == 0 {
                break;
            }
            if n < stamp_buf.len() {
                bail!("truncated record: {} trailing bytes", n);
            }
            let millis = u32::from_le_bytes(stamp_buf);

            let count = reader
                .read_u32::<LittleEndian>()
                .context("truncated record: missing point count")?;
            let mut cloud = Cloud::with_capacity(count as usize);
            for _ in 0..count {
                let x = reader.read_f32::<LittleEndian>()?;
                let y = reader.read_f32::<LittleEndian>()?;
                let z = reader.read_f32::<LittleEndian>()?;
                cloud.push(Point::new(x, y, z));
            }
            frames.push((millis, cloud));
        }
        Ok(Self { frames })
    }

    pub fn write_to<W: Write>(&self, out: W) -> Result<()> {
        let mut writer = CloudLogWriter::new(out);
        for (millis, cloud) in &self.frames {
            writer.log(*millis, cloud)?;
        }
        writer.flush()
    }

    pub fn push(&mut self, millis: u32, cloud: Cloud) {
        self.frames.push((millis, cloud));
    }

    pub fn frames(&self) -> &[(u32, Cloud)] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Replay every frame into the tracker at its recorded stamp.
    pub fn play(&self, tracker: &mut Tracker) -> Result<()> {
        for (millis, cloud) in &self.frames {
            tracker.update(Duration::from_millis(*millis as u64), cloud)?;
        }
        Ok(())
    }

    /// Replay the log and emit, per frame, every body's marker constellation
    /// transformed by its current pose estimate. Useful for eyeballing how
    /// the fitted models track the raw observations.
    pub fn reproject(&self, tracker: &mut Tracker) -> Result<CloudLog> {
        let mut out = CloudLog::new();
        for (millis, cloud) in &self.frames {
            tracker.update(Duration::from_millis(*millis as u64), cloud)?;
            let mut fitted = Cloud::new();
            for body in tracker.rigid_bodies() {
                let markers = &tracker.marker_configurations[body.marker_configuration_idx];
                let pose = body.transformation();
                fitted.extend(markers.iter().map(|m| pose.transform_point(m)));
            }
            out.push(*millis, fitted);
        }
        Ok(out)
    }
}

/// Fill `buf` from `reader`, returning how many bytes were read before the
/// stream ended.
fn read_until_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Pose;
    use crate::tracker::{DynamicsConfiguration, RigidBody, TrackingPhase};
    use std::io::Cursor;

    fn sample_frames() -> Vec<(u32, Cloud)> {
        vec![
            (0, Cloud::new()),
            (
                17,
                vec![
                    Point::new(1.5, -2.25, 1.0e-7),
                    Point::new(f32::MIN_POSITIVE, -0.0, 3.75),
                    Point::new(123.456, -789.25, 0.001),
                    Point::new(-1.0, 2.0, -3.0),
                ],
            ),
            (
                4242,
                (0..7)
                    .map(|i| Point::new(i as f32 * 0.125, -(i as f32), 0.5 + i as f32))
                    .collect(),
            ),
        ]
    }

    #[test]
    fn test_roundtrip_is_bit_exact() {
        let mut log = CloudLog::new();
        for (millis, cloud) in sample_frames() {
            log.push(millis, cloud);
        }

        let mut buf = Vec::new();
        log.write_to(&mut buf).unwrap();
        let decoded = CloudLog::read_from(Cursor::new(buf)).unwrap();

        assert_eq!(decoded.len(), log.len());
        for ((t_in, c_in), (t_out, c_out)) in log.frames().iter().zip(decoded.frames()) {
            assert_eq!(t_in, t_out);
            assert_eq!(c_in.len(), c_out.len());
            for (p_in, p_out) in c_in.iter().zip(c_out) {
                assert_eq!(p_in.x.to_bits(), p_out.x.to_bits());
                assert_eq!(p_in.y.to_bits(), p_out.y.to_bits());
                assert_eq!(p_in.z.to_bits(), p_out.z.to_bits());
            }
        }
    }

    #[test]
    fn test_record_size_matches_format() {
        let mut buf = Vec::new();
        let mut writer = CloudLogWriter::new(&mut buf);
        writer.log(5, &[Point::new(1.0, 2.0, 3.0)]).unwrap();
        writer.flush().unwrap();
        assert_eq!(buf.len(), 4 + 4 + 12);
        assert_eq!(&buf[0..4], &5u32.to_le_bytes()[..]);
        assert_eq!(&buf[4..8], &1u32.to_le_bytes()[..]);
        assert_eq!(&buf[8..12], &1.0f32.to_le_bytes()[..]);
    }

    #[test]
    fn test_empty_stream_is_empty_log() {
        let log = CloudLog::read_from(Cursor::new(Vec::new())).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut buf = Vec::new();
        let mut writer = CloudLogWriter::new(&mut buf);
        writer.log(5, &[Point::new(1.0, 2.0, 3.0)]).unwrap();
        writer.flush().unwrap();
        buf.extend_from_slice(&[0xAB, 0xCD]);

        assert!(CloudLog::read_from(Cursor::new(buf)).is_err());
    }

    fn triangle() -> Cloud {
        vec![
            Point::new(0.0, 0.0, 0.0),
            Point::new(0.1, 0.0, 0.0),
            Point::new(0.0, 0.1, 0.0),
        ]
    }

    fn test_tracker() -> Tracker {
        Tracker::new(
            vec![DynamicsConfiguration {
                max_x_velocity: 2.0,
                max_y_velocity: 2.0,
                max_z_velocity: 2.0,
                max_roll_rate: 10.0,
                max_pitch_rate: 10.0,
                max_yaw_rate: 10.0,
                max_roll: 1.5,
                max_pitch: 1.5,
                max_fitness_score: 1e-4,
            }],
            vec![triangle()],
            vec![RigidBody::new(0, 0, Pose::identity(), "probe")],
        )
        .unwrap()
    }

    #[test]
    fn test_play_drives_the_tracker() {
        let mut log = CloudLog::new();
        log.push(0, triangle());
        log.push(10, triangle());

        let mut tracker = test_tracker();
        log.play(&mut tracker).unwrap();

        assert_eq!(tracker.phase(), TrackingPhase::Tracking);
        assert!(tracker.rigid_bodies()[0].last_transformation_valid());
    }

    #[test]
    fn test_reproject_emits_one_point_per_marker() {
        let mut log = CloudLog::new();
        log.push(0, triangle());
        log.push(10, triangle());

        let mut tracker = test_tracker();
        let fitted = log.reproject(&mut tracker).unwrap();

        assert_eq!(fitted.len(), 2);
        for (_, cloud) in fitted.frames() {
            assert_eq!(cloud.len(), 3);
        }
        // Once tracking is valid the reprojection sits on the observations.
        let (_, last) = &fitted.frames()[1];
        for (fit, obs) in last.iter().zip(&triangle()) {
            assert!((fit.coords - obs.coords).norm() < 1e-3);
        }
    }
}
