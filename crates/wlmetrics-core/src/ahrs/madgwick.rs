//! Madgwick gradient-descent orientation filter.

use nalgebra::{Matrix3x4, Vector3, Vector4};

use super::{magnetic_reference, rate_of_change, unit, Ahrs, ImuSample};
use crate::error::Result;
use crate::quaternion::Quaternion;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MadgwickParams {
    /// Gradient-descent gain (rad/s).
    pub beta: f64,
}

impl Default for MadgwickParams {
    fn default() -> Self {
        Self { beta: 0.1 }
    }
}

#[derive(Clone, Debug)]
pub struct MadgwickFilter {
    params: MadgwickParams,
    sample_period: f64,
    q: Quaternion,
}

impl MadgwickFilter {
    pub fn new(frequency: f64, params: MadgwickParams) -> Self {
        Self {
            params,
            sample_period: 1.0 / frequency,
            q: Quaternion::identity(),
        }
    }

    pub fn with_orientation(mut self, q: Quaternion) -> Self {
        self.q = q;
        self
    }

    pub fn params(&self) -> &MadgwickParams {
        &self.params
    }

    /// Objective gradient `Jᵗ·f` for the gravity term and, if given, the
    /// magnetic term. `a` and `m` must be unit vectors.
    fn gradient(&self, a: &Vector3<f64>, m: Option<&Vector3<f64>>) -> Vector4<f64> {
        let q = &self.q;
        let (q1, q2, q3, q4) = (q.w(), q.x(), q.y(), q.z());

        let f_g = Vector3::new(
            2.0 * (q2 * q4 - q1 * q3) - a.x,
            2.0 * (q1 * q2 + q3 * q4) - a.y,
            2.0 * (0.5 - q2 * q2 - q3 * q3) - a.z,
        );
        #[rustfmt::skip]
        let j_g = Matrix3x4::new(
            -2.0 * q3,  2.0 * q4, -2.0 * q1, 2.0 * q2,
             2.0 * q2,  2.0 * q1,  2.0 * q4, 2.0 * q3,
             0.0,      -4.0 * q2, -4.0 * q3, 0.0,
        );
        let mut nabla = j_g.transpose() * f_g;

        if let Some(m) = m {
            let (bx, bz) = magnetic_reference(q, m);
            let f_b = Vector3::new(
                2.0 * bx * (0.5 - q3 * q3 - q4 * q4) + 2.0 * bz * (q2 * q4 - q1 * q3) - m.x,
                2.0 * bx * (q2 * q3 - q1 * q4) + 2.0 * bz * (q1 * q2 + q3 * q4) - m.y,
                2.0 * bx * (q1 * q3 + q2 * q4) + 2.0 * bz * (0.5 - q2 * q2 - q3 * q3) - m.z,
            );
            #[rustfmt::skip]
            let j_b = Matrix3x4::new(
                -2.0 * bz * q3,
                2.0 * bz * q4,
                -4.0 * bx * q3 - 2.0 * bz * q1,
                -4.0 * bx * q4 + 2.0 * bz * q2,

                -2.0 * bx * q4 + 2.0 * bz * q2,
                2.0 * bx * q3 + 2.0 * bz * q1,
                2.0 * bx * q2 + 2.0 * bz * q4,
                -2.0 * bx * q1 + 2.0 * bz * q3,

                2.0 * bx * q3,
                2.0 * bx * q4 - 4.0 * bz * q2,
                2.0 * bx * q1 - 4.0 * bz * q3,
                2.0 * bx * q2,
            );
            nabla += j_b.transpose() * f_b;
        }
        nabla
    }
}

impl Ahrs for MadgwickFilter {
    fn orientation(&self) -> Quaternion {
        self.q
    }

    fn update(&mut self, sample: &ImuSample) -> Result<Quaternion> {
        let mut q_dot = rate_of_change(&self.q, &sample.gyro);

        // a zero accelerometer reading leaves only gyro integration
        if let Some(a) = unit(&sample.accel) {
            let m = sample.usable_mag().and_then(|m| unit(&m));
            let nabla = self.gradient(&a, m.as_ref());
            if let Some(step) = nabla.try_normalize(0.0) {
                let step = Quaternion::new(step[0], step[1], step[2], step[3]);
                q_dot = q_dot - step * self.params.beta;
            }
        }

        let mut q = self.q + q_dot * self.sample_period;
        q.normalize()?;
        self.q = q;
        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use core::f64::consts::FRAC_PI_4;

    const FREQ: f64 = 100.0;

    fn at_rest() -> ImuSample {
        ImuSample::new(Vector3::new(0.0, 0.0, 1.0), Vector3::zeros())
    }

    /// Gravity direction the estimate predicts in the sensor frame.
    fn predicted_gravity(q: &Quaternion) -> Vector3<f64> {
        q.conjugate().rotate_vector(&Vector3::z())
    }

    #[test]
    fn test_level_rest_holds_identity() {
        let mut filter = MadgwickFilter::new(FREQ, MadgwickParams::default());
        let out = filter.filter(&vec![at_rest(); 500]).unwrap();
        assert_eq!(out.len(), 500);
        for q in out {
            assert_relative_eq!(q.w(), 1.0, epsilon = 1e-12);
            assert_relative_eq!(q.norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_converges_to_tilted_gravity() {
        let mut filter = MadgwickFilter::new(FREQ, MadgwickParams { beta: 0.5 });
        let gravity = Vector3::new(0.0, 0.5, 0.75_f64.sqrt());
        let sample = ImuSample::new(gravity, Vector3::zeros());
        for _ in 0..600 {
            filter.update(&sample).unwrap();
        }
        let q = filter.orientation();
        assert_relative_eq!(predicted_gravity(&q), gravity, epsilon = 0.02);
    }

    #[test]
    fn test_gyro_integration_about_z() {
        // pure rotation with gravity along the rotation axis
        let mut filter = MadgwickFilter::new(FREQ, MadgwickParams::default());
        let sample = ImuSample::new(Vector3::z(), Vector3::new(0.0, 0.0, FRAC_PI_4));
        for _ in 0..100 {
            filter.update(&sample).unwrap();
        }
        let (roll, pitch, yaw) = filter.orientation().euler_angles();
        assert_relative_eq!(roll, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pitch, 0.0, epsilon = 1e-9);
        assert_relative_eq!(yaw, FRAC_PI_4, epsilon = 1e-3);
    }

    #[test]
    fn test_zero_accel_skips_correction() {
        let start = Quaternion::new(0.9, 0.1, 0.3, 0.0).normalized().unwrap();
        let mut filter = MadgwickFilter::new(FREQ, MadgwickParams::default()).with_orientation(start);
        let q = filter
            .update(&ImuSample::new(Vector3::zeros(), Vector3::zeros()))
            .unwrap();
        assert_relative_eq!(q.w(), start.w(), epsilon = 1e-12);
        assert_relative_eq!(q.x(), start.x(), epsilon = 1e-12);
        assert_relative_eq!(q.y(), start.y(), epsilon = 1e-12);
    }

    #[test]
    fn test_magnetometer_aligns_heading() {
        let field = Vector3::new(0.6, 0.0, 0.8);
        // sensor yawed by 90°: earth x appears along sensor -y
        let mag = Vector3::new(0.0, -0.6, 0.8);
        let sample = ImuSample::new(Vector3::z(), Vector3::zeros()).with_mag(mag);

        let mut marg = MadgwickFilter::new(FREQ, MadgwickParams { beta: 0.5 });
        let mut imu = MadgwickFilter::new(FREQ, MadgwickParams { beta: 0.5 });
        for _ in 0..1000 {
            marg.update(&sample).unwrap();
            imu.update(&ImuSample::new(Vector3::z(), Vector3::zeros()))
                .unwrap();
        }

        let q = marg.orientation();
        assert_relative_eq!(q.conjugate().rotate_vector(&field), mag, epsilon = 0.05);
        assert_relative_eq!(predicted_gravity(&q), Vector3::z(), epsilon = 0.05);
        // without a magnetometer heading is unobservable
        assert_relative_eq!(imu.orientation().w(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_mag_falls_back_to_imu() {
        let start = Quaternion::new(0.95, 0.2, -0.1, 0.2).normalized().unwrap();
        let accel = Vector3::new(0.1, 0.2, 0.95);
        let gyro = Vector3::new(0.01, -0.02, 0.03);

        let mut a = MadgwickFilter::new(FREQ, MadgwickParams::default()).with_orientation(start);
        let mut b = a.clone();
        let qa = a.update(&ImuSample::new(accel, gyro)).unwrap();
        let qb = b
            .update(&ImuSample::new(accel, gyro).with_mag(Vector3::zeros()))
            .unwrap();
        assert_eq!(qa, qb);
    }
}
