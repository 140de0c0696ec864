//! Mahony complementary filter with proportional-integral feedback.

use nalgebra::Vector3;

use super::{magnetic_reference, rate_of_change, unit, Ahrs, ImuSample};
use crate::error::Result;
use crate::quaternion::Quaternion;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MahonyParams {
    /// Proportional gain.
    pub kp: f64,
    /// Integral gain; zero disables gyro bias estimation.
    pub ki: f64,
}

impl Default for MahonyParams {
    fn default() -> Self {
        Self { kp: 0.5, ki: 0.0 }
    }
}

#[derive(Clone, Debug)]
pub struct MahonyFilter {
    params: MahonyParams,
    sample_period: f64,
    q: Quaternion,
    integral: Vector3<f64>,
}

impl MahonyFilter {
    pub fn new(frequency: f64, params: MahonyParams) -> Self {
        Self {
            params,
            sample_period: 1.0 / frequency,
            q: Quaternion::identity(),
            integral: Vector3::zeros(),
        }
    }

    pub fn with_orientation(mut self, q: Quaternion) -> Self {
        self.q = q;
        self
    }

    pub fn params(&self) -> &MahonyParams {
        &self.params
    }

    /// Accumulated integral feedback (rad/s).
    pub fn integral(&self) -> Vector3<f64> {
        self.integral
    }

    /// Cross-product error between measured and estimated reference
    /// directions. `a` and `m` must be unit vectors.
    fn error(&self, a: &Vector3<f64>, m: Option<&Vector3<f64>>) -> Vector3<f64> {
        let to_sensor = self.q.conjugate();
        let v = to_sensor.rotate_vector(&Vector3::z());
        let mut e = a.cross(&v);
        if let Some(m) = m {
            let (bx, bz) = magnetic_reference(&self.q, m);
            let w = to_sensor.rotate_vector(&Vector3::new(bx, 0.0, bz));
            e += m.cross(&w);
        }
        e
    }
}

impl Ahrs for MahonyFilter {
    fn orientation(&self) -> Quaternion {
        self.q
    }

    fn update(&mut self, sample: &ImuSample) -> Result<Quaternion> {
        let mut omega = sample.gyro;

        if let Some(a) = unit(&sample.accel) {
            let m = sample.usable_mag().and_then(|m| unit(&m));
            let e = self.error(&a, m.as_ref());
            if self.params.ki > 0.0 {
                self.integral += e * (self.params.ki * self.sample_period);
                omega += self.integral;
            } else {
                self.integral = Vector3::zeros();
            }
            omega += e * self.params.kp;
        }

        let mut q = self.q + rate_of_change(&self.q, &omega) * self.sample_period;
        q.normalize()?;
        self.q = q;
        Ok(q)
    }
}
