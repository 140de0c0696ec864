use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use wlmetrics_core::{ImuSample, GRAVITY};

use crate::error::Result;
use crate::params;
use crate::sim::SimResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub noise_scale: f64,
    pub accel_noise_std: f64, // g
    pub gyro_noise_std: f64,  // rad/s
    pub mag_noise_std: f64,   // field units

    // Constant biases
    pub accel_bias: [f64; 3],
    pub gyro_bias: [f64; 3],

    /// Earth magnetic field (world frame, z up). `None` disables the
    /// magnetometer.
    pub magnetic_field: Option<[f64; 3]>,

    pub seed: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            noise_scale: 1.0,
            accel_noise_std: 0.005,
            gyro_noise_std: 0.002,
            mag_noise_std: 0.002,
            accel_bias: [0.0; 3],
            gyro_bias: [0.0; 3],
            // ~0.5 G, dipping down
            magnetic_field: Some([0.22, 0.0, -0.42]),
            seed: 42,
        }
    }
}

impl SensorConfig {
    /// Same field and seed, no noise and no bias.
    pub fn ideal() -> Self {
        Self {
            noise_scale: 0.0,
            ..Self::default()
        }
    }

    /// Checks the per-axis noise levels against their declared bounds.
    pub fn validate(&self) -> Result<()> {
        params::sensor::ACCEL_NOISE_STD.check(self.accel_noise_std)?;
        params::sensor::GYRO_NOISE_STD.check(self.gyro_noise_std)?;
        params::sensor::MAG_NOISE_STD.check(self.mag_noise_std)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct SensorData {
    pub time: Vec<f64>,
    /// Specific force in the body frame (g), gravity included.
    pub accel_meas: Vec<Vector3<f64>>,
    pub gyro_meas: Vec<Vector3<f64>>,
    pub mag_meas: Option<Vec<Vector3<f64>>>,
}

impl SensorData {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn imu_samples(&self) -> Vec<ImuSample> {
        (0..self.len())
            .map(|i| {
                let sample = ImuSample::new(self.accel_meas[i], self.gyro_meas[i]);
                match &self.mag_meas {
                    Some(mag) => sample.with_mag(mag[i]),
                    None => sample,
                }
            })
            .collect()
    }
}

fn noisy(v: Vector3<f64>, d: &Normal<f64>, rng: &mut StdRng) -> Vector3<f64> {
    v + Vector3::from_fn(|_, _| d.sample(rng))
}

pub fn generate_sensor_data(sim: &SimResult, cfg: &SensorConfig) -> Result<SensorData> {
    cfg.validate()?;
    let mut rng = StdRng::seed_from_u64(cfg.seed);

    let d_accel = Normal::new(0.0, cfg.noise_scale * cfg.accel_noise_std)?;
    let d_gyro = Normal::new(0.0, cfg.noise_scale * cfg.gyro_noise_std)?;
    let d_mag = Normal::new(0.0, cfg.noise_scale * cfg.mag_noise_std)?;

    let accel_bias = Vector3::from(cfg.accel_bias);
    let gyro_bias = Vector3::from(cfg.gyro_bias);
    let field = cfg.magnetic_field.map(Vector3::from);

    let n = sim.len();
    let mut data = SensorData {
        time: sim.time.clone(),
        accel_meas: Vec::with_capacity(n),
        gyro_meas: Vec::with_capacity(n),
        mag_meas: field.map(|_| Vec::with_capacity(n)),
    };

    let up = Vector3::new(0.0, 0.0, GRAVITY);
    for i in 0..n {
        let att = &sim.orientation[i];

        // an accelerometer at rest reads 1 g up
        let specific_force = att.inverse_transform_vector(&(sim.accel[i] + up)) / GRAVITY;
        data.accel_meas
            .push(noisy(specific_force + accel_bias, &d_accel, &mut rng));

        data.gyro_meas
            .push(noisy(sim.ang_vel[i] + gyro_bias, &d_gyro, &mut rng));

        if let (Some(field), Some(mag)) = (field, data.mag_meas.as_mut()) {
            mag.push(noisy(att.inverse_transform_vector(&field), &d_mag, &mut rng));
        }
    }

    Ok(data)
}
