//! Attitude and heading reference filters.
//!
//! Both filters integrate the gyroscope and pull the estimate toward the
//! orientation implied by gravity (and, when present, the magnetic field).
//! Orientation is reported as the rotation from the sensor frame to the
//! earth frame.

mod madgwick;
mod mahony;

pub use madgwick::{MadgwickFilter, MadgwickParams};
pub use mahony::{MahonyFilter, MahonyParams};

use nalgebra::Vector3;

use crate::error::{FusionError, Result};
use crate::quaternion::Quaternion;

/// One synchronized IMU reading.
///
/// Accelerometer and magnetometer units are arbitrary since both are
/// normalized; the gyroscope is in rad/s.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ImuSample {
    pub accel: Vector3<f64>,
    pub gyro: Vector3<f64>,
    pub mag: Option<Vector3<f64>>,
}

impl ImuSample {
    pub fn new(accel: Vector3<f64>, gyro: Vector3<f64>) -> Self {
        Self {
            accel,
            gyro,
            mag: None,
        }
    }

    pub fn with_mag(mut self, mag: Vector3<f64>) -> Self {
        self.mag = Some(mag);
        self
    }

    /// Builds a sample from `[ax, ay, az, gx, gy, gz]` or the same followed
    /// by `[mx, my, mz]`.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        match values.len() {
            6 | 9 => {
                let accel = Vector3::from_column_slice(&values[0..3]);
                let gyro = Vector3::from_column_slice(&values[3..6]);
                let mag = (values.len() == 9).then(|| Vector3::from_column_slice(&values[6..9]));
                Ok(Self { accel, gyro, mag })
            }
            found => Err(FusionError::InvalidDimension {
                expected: if found < 6 { 6 } else { 9 },
                found,
            }),
        }
    }

    /// Magnetometer reading, unless absent or all zero.
    pub(crate) fn usable_mag(&self) -> Option<Vector3<f64>> {
        self.mag.filter(|m| *m != Vector3::zeros())
    }
}

pub trait Ahrs {
    /// Current orientation estimate (unit quaternion).
    fn orientation(&self) -> Quaternion;

    /// Advances the estimate by one sample period and returns it.
    fn update(&mut self, sample: &ImuSample) -> Result<Quaternion>;

    /// Runs [`update`](Self::update) over every sample in order.
    fn filter(&mut self, samples: &[ImuSample]) -> Result<Vec<Quaternion>> {
        samples.iter().map(|s| self.update(s)).collect()
    }
}

/// Unit vector along `v`, or `None` for the zero vector.
fn unit(v: &Vector3<f64>) -> Option<Vector3<f64>> {
    v.try_normalize(0.0)
}

/// Horizontal and vertical components `(bx, bz)` of the earth-frame
/// magnetic reference, given the sensor-frame reading `m` (unit length).
fn magnetic_reference(q: &Quaternion, m: &Vector3<f64>) -> (f64, f64) {
    let h = q.rotate_vector(m);
    ((h.x * h.x + h.y * h.y).sqrt(), h.z)
}

/// Rate of change of `q` under body angular rate `omega`: `½ q ⊗ (0, ω)`.
fn rate_of_change(q: &Quaternion, omega: &Vector3<f64>) -> Quaternion {
    *q * Quaternion::from_vector(omega) * 0.5
}
