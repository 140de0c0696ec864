//! CSV interchange for recorded and filtered sessions.
//!
//! Input files carry a header row. `time`, `ax`, `ay`, `az` are required;
//! `gx`, `gy`, `gz` are needed for orientation and `mx`, `my`, `mz` are
//! optional per row (an empty cell means no magnetometer reading).

use std::io::{Read, Write};
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use nalgebra::Vector3;
use serde::Deserialize;
use wlmetrics_core::{ImuSample, PositionTrajectory, Quaternion};

#[derive(Debug, Deserialize)]
struct SampleRow {
    time: f64,
    ax: f64,
    ay: f64,
    az: f64,
    #[serde(default)]
    gx: Option<f64>,
    #[serde(default)]
    gy: Option<f64>,
    #[serde(default)]
    gz: Option<f64>,
    #[serde(default)]
    mx: Option<f64>,
    #[serde(default)]
    my: Option<f64>,
    #[serde(default)]
    mz: Option<f64>,
}

fn vector(x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Option<Vector3<f64>> {
    Some(Vector3::new(x?, y?, z?))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Recording {
    pub time: Vec<f64>,
    /// Accelerometer (g).
    pub accel: Vec<Vector3<f64>>,
    /// Gyroscope (rad/s); `None` for rows without all three components.
    pub gyro: Vec<Option<Vector3<f64>>>,
    pub mag: Vec<Option<Vector3<f64>>>,
}

impl Recording {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Samples for the orientation filters. Every row needs a gyroscope
    /// reading.
    pub fn imu_samples(&self) -> Result<Vec<ImuSample>> {
        self.accel
            .iter()
            .zip(&self.gyro)
            .zip(&self.mag)
            .enumerate()
            .map(|(row, ((accel, gyro), mag))| {
                let gyro = (*gyro).with_context(|| format!("row {row}: missing gyroscope reading"))?;
                let sample = ImuSample::new(*accel, gyro);
                Ok(match mag {
                    Some(m) => sample.with_mag(*m),
                    None => sample,
                })
            })
            .collect()
    }
}

pub fn read_recording(reader: impl Read) -> Result<Recording> {
    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rec = Recording::default();
    for (row, result) in rdr.deserialize::<SampleRow>().enumerate() {
        let r = result.with_context(|| format!("malformed sample at row {row}"))?;
        rec.time.push(r.time);
        rec.accel.push(Vector3::new(r.ax, r.ay, r.az));
        rec.gyro.push(vector(r.gx, r.gy, r.gz));
        rec.mag.push(vector(r.mx, r.my, r.mz));
    }
    Ok(rec)
}

pub fn read_recording_path(path: &Path) -> Result<Recording> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let rec = read_recording(file).with_context(|| format!("failed to read {}", path.display()))?;
    ensure!(!rec.is_empty(), "{} contains no samples", path.display());
    Ok(rec)
}

/// Sampling frequency from the median positive timestamp spacing.
pub fn estimate_frequency(time: &[f64]) -> Result<f64> {
    let mut dts: Vec<f64> = time
        .windows(2)
        .map(|w| w[1] - w[0])
        .filter(|dt| *dt > 0.0)
        .collect();
    if dts.is_empty() {
        bail!("cannot derive a sampling frequency from {} timestamps", time.len());
    }
    dts.sort_by(f64::total_cmp);
    let mid = dts.len() / 2;
    let median = if dts.len() % 2 == 0 {
        0.5 * (dts[mid - 1] + dts[mid])
    } else {
        dts[mid]
    };
    Ok(1.0 / median)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn cell(v: f64) -> String {
    format!("{v:.6}")
}

pub fn write_position(
    writer: impl Write,
    time: &[f64],
    trajectory: &PositionTrajectory,
) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record([
        "time", "acc_x", "acc_y", "acc_z", "vel_x", "vel_y", "vel_z", "pos_x", "pos_y", "pos_z",
        "static", "gravity_x", "gravity_y", "gravity_z",
    ])?;

    let rows = time
        .iter()
        .zip(&trajectory.states)
        .zip(&trajectory.static_mask)
        .zip(&trajectory.gravity);
    for (((t, state), mask), gravity) in rows {
        let mut record = Vec::with_capacity(14);
        record.push(cell(*t));
        record.extend(state.iter().map(|v| cell(*v)));
        record.push(mask.to_string());
        record.extend(gravity.iter().map(|v| cell(*v)));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_orientation(writer: impl Write, time: &[f64], orientation: &[Quaternion]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(["time", "qw", "qx", "qy", "qz", "roll", "pitch", "yaw"])?;
    for (t, q) in time.iter().zip(orientation) {
        let (roll, pitch, yaw) = q.euler_angles();
        let mut record = vec![cell(*t)];
        record.extend(q.to_array().map(cell));
        record.extend([roll, pitch, yaw].map(cell));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}
