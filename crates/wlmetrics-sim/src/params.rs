//! Bounds for the tunable filter and scenario parameters.

use crate::error::{Result, SimError};

/// Parameter specification with bounds and step size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    /// Human-readable label.
    pub label: &'static str,
    /// Minimum value.
    pub min: f64,
    /// Maximum value.
    pub max: f64,
    /// Suggested increment when sweeping.
    pub step: f64,
}

impl ParamSpec {
    /// Create a new parameter specification.
    pub const fn new(label: &'static str, min: f64, max: f64, step: f64) -> Self {
        Self {
            label,
            min,
            max,
            step,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    /// Returns `value` unchanged if it is within bounds.
    pub fn check(&self, value: f64) -> Result<f64> {
        if self.contains(value) {
            Ok(value)
        } else {
            Err(SimError::OutOfRange {
                label: self.label,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }
}

/// Sampling parameters.
pub mod sampling {
    use super::ParamSpec;

    pub const FREQUENCY: ParamSpec = ParamSpec::new("Sampling Frequency (Hz)", 1.0, 4000.0, 1.0);
}

/// Static-detecting position filter.
pub mod position {
    use super::ParamSpec;

    pub const THRESHOLD: ParamSpec = ParamSpec::new("Static Threshold (g)", 0.001, 1.0, 0.005);
    pub const STATIC_TIME: ParamSpec = ParamSpec::new("Static Time (s)", 0.0, 10.0, 0.05);
    pub const PROCESS_NOISE: ParamSpec = ParamSpec::new("Process Noise", 1e-6, 1e3, 0.01);
    pub const OBSERVATION_NOISE: ParamSpec =
        ParamSpec::new("Observation Noise ((m/s²)²)", 1e-6, 1e4, 0.5);
}

/// Orientation filters.
pub mod ahrs {
    use super::ParamSpec;

    pub const BETA: ParamSpec = ParamSpec::new("Madgwick Beta (rad/s)", 0.0, 5.0, 0.01);
    pub const KP: ParamSpec = ParamSpec::new("Mahony Kp", 0.0, 20.0, 0.1);
    pub const KI: ParamSpec = ParamSpec::new("Mahony Ki", 0.0, 5.0, 0.01);
}

/// Sensor noise.
pub mod sensor {
    use super::ParamSpec;

    pub const ACCEL_NOISE_STD: ParamSpec = ParamSpec::new("Accel Noise (g)", 0.0, 1.0, 0.001);
    pub const GYRO_NOISE_STD: ParamSpec = ParamSpec::new("Gyro Noise (rad/s)", 0.0, 1.0, 0.001);
    pub const MAG_NOISE_STD: ParamSpec = ParamSpec::new("Mag Noise", 0.0, 1.0, 0.001);
}
