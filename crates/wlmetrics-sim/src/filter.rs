use std::ops::RangeInclusive;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use tracing::info;
use wlmetrics_core::intervals::active_ranges;
use wlmetrics_core::kalman::layout;
use wlmetrics_core::{
    Ahrs, CovarianceUpdate, MadgwickFilter, MadgwickParams, MahonyFilter, MahonyParams,
    PositionFilterConfig, PositionTrajectory, Quaternion, StaticDetectingPositionFilter,
};

use crate::error::{Result, SimError};
use crate::params;
use crate::sensor::SensorData;
use crate::sim::SimResult;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceForm {
    Simple,
    #[default]
    Symmetrized,
    Joseph,
}

impl From<CovarianceForm> for CovarianceUpdate {
    fn from(form: CovarianceForm) -> Self {
        match form {
            CovarianceForm::Simple => Self::Simple,
            CovarianceForm::Symmetrized => Self::Symmetrized,
            CovarianceForm::Joseph => Self::Joseph,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AhrsKind {
    #[default]
    Madgwick,
    Mahony,
}

/// Tuning for both filters. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    // static-detecting position filter
    pub threshold: f64,
    pub static_time: f64,
    pub start_static: bool,
    pub process_noise: f64,
    pub observation_noise: f64,
    pub covariance_update: CovarianceForm,

    // orientation filter
    pub ahrs: AhrsKind,
    pub beta: f64,
    pub kp: f64,
    pub ki: f64,
    /// Ignore magnetometer readings even when present.
    pub imu_only: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let position = PositionFilterConfig::new(1.0);
        let madgwick = MadgwickParams::default();
        let mahony = MahonyParams::default();
        Self {
            threshold: position.threshold,
            static_time: position.static_time,
            start_static: position.start_static,
            process_noise: position.process_noise,
            observation_noise: position.observation_noise,
            covariance_update: CovarianceForm::default(),
            ahrs: AhrsKind::default(),
            beta: madgwick.beta,
            kp: mahony.kp,
            ki: mahony.ki,
            imu_only: false,
        }
    }
}

impl FilterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "threshold": self.threshold,
            "static_time": self.static_time,
            "start_static": self.start_static,
            "process_noise": self.process_noise,
            "observation_noise": self.observation_noise,
            "covariance_update": self.covariance_update,
            "ahrs": self.ahrs,
            "beta": self.beta,
            "kp": self.kp,
            "ki": self.ki,
            "imu_only": self.imu_only,
        })
    }

    pub fn validate(&self) -> Result<()> {
        params::position::THRESHOLD.check(self.threshold)?;
        params::position::STATIC_TIME.check(self.static_time)?;
        params::position::PROCESS_NOISE.check(self.process_noise)?;
        params::position::OBSERVATION_NOISE.check(self.observation_noise)?;
        params::ahrs::BETA.check(self.beta)?;
        params::ahrs::KP.check(self.kp)?;
        params::ahrs::KI.check(self.ki)?;
        Ok(())
    }

    pub fn position_config(&self, frequency: f64) -> PositionFilterConfig {
        PositionFilterConfig {
            frequency,
            threshold: self.threshold,
            static_time: self.static_time,
            start_static: self.start_static,
            process_noise: self.process_noise,
            observation_noise: self.observation_noise,
            covariance_update: self.covariance_update.into(),
        }
    }

    /// Orientation filter selected by `ahrs`, starting from `initial`.
    pub fn build_ahrs(&self, frequency: f64, initial: Quaternion) -> Box<dyn Ahrs> {
        match self.ahrs {
            AhrsKind::Madgwick => Box::new(
                MadgwickFilter::new(frequency, MadgwickParams { beta: self.beta })
                    .with_orientation(initial),
            ),
            AhrsKind::Mahony => Box::new(
                MahonyFilter::new(
                    frequency,
                    MahonyParams {
                        kp: self.kp,
                        ki: self.ki,
                    },
                )
                .with_orientation(initial),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Error statistics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ErrorStats {
    pub rmse: f64,
    pub max: f64,
    pub count: usize,
}

impl ErrorStats {
    pub fn from_errors(errors: impl IntoIterator<Item = f64>) -> Self {
        let mut sum_sq = 0.0;
        let mut max = 0.0_f64;
        let mut count = 0;
        for e in errors {
            sum_sq += e * e;
            max = max.max(e.abs());
            count += 1;
        }
        let rmse = if count == 0 {
            0.0
        } else {
            (sum_sq / count as f64).sqrt()
        };
        Self { rmse, max, count }
    }
}

fn check_lengths(sim: &SimResult, data: &SensorData) -> Result<()> {
    if sim.len() != data.len() {
        return Err(SimError::LengthMismatch {
            sensor: data.len(),
            sim: sim.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Runners
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PositionRun {
    pub time: Vec<f64>,
    pub trajectory: PositionTrajectory,
    pub static_ranges: Vec<RangeInclusive<usize>>,
    pub position_error: ErrorStats,
    pub velocity_error: ErrorStats,
}

/// Runs the static-detecting position filter over `data`.
///
/// The filter tracks motion in the sensor frame, so errors are only
/// meaningful while the body does not rotate.
pub fn run_position_filter(
    sim: &SimResult,
    data: &SensorData,
    config: &FilterConfig,
) -> Result<PositionRun> {
    check_lengths(sim, data)?;
    let mut filter =
        StaticDetectingPositionFilter::with_config(config.position_config(sim.frequency));
    let trajectory = filter.filter(&data.accel_meas)?;

    let position_error = ErrorStats::from_errors(
        trajectory
            .positions()
            .zip(&sim.pos)
            .map(|(est, truth)| (est - truth).norm()),
    );
    let velocity_error = ErrorStats::from_errors(
        trajectory
            .states
            .iter()
            .zip(&sim.vel)
            .map(|(s, truth)| (s.fixed_rows::<3>(layout::VELOCITY) - truth).norm()),
    );
    let static_ranges = active_ranges(&trajectory.static_mask);

    info!(
        samples = trajectory.len(),
        static_intervals = static_ranges.len(),
        position_rmse = position_error.rmse,
        velocity_rmse = velocity_error.rmse,
        "position filter run complete"
    );

    Ok(PositionRun {
        time: data.time.clone(),
        trajectory,
        static_ranges,
        position_error,
        velocity_error,
    })
}

#[derive(Debug, Clone)]
pub struct OrientationRun {
    pub time: Vec<f64>,
    pub orientation: Vec<Quaternion>,
    /// Angle between estimated and true gravity directions (rad).
    pub tilt_error: ErrorStats,
    /// Full rotation angle between estimate and truth (rad).
    pub attitude_error: ErrorStats,
}

fn attitude_angle(est: &UnitQuaternion<f64>, truth: &UnitQuaternion<f64>) -> f64 {
    truth.angle_to(est)
}

fn tilt_angle(est: &UnitQuaternion<f64>, truth: &UnitQuaternion<f64>) -> f64 {
    let up = Vector3::z();
    let g_est = est.inverse_transform_vector(&up);
    let g_true = truth.inverse_transform_vector(&up);
    g_est.angle(&g_true)
}

/// Runs the configured orientation filter over `data`, starting from the
/// true initial orientation.
pub fn run_orientation_filter(
    sim: &SimResult,
    data: &SensorData,
    config: &FilterConfig,
) -> Result<OrientationRun> {
    check_lengths(sim, data)?;
    let mut samples = data.imu_samples();
    if config.imu_only {
        samples.iter_mut().for_each(|s| s.mag = None);
    }

    let initial = sim
        .orientation
        .first()
        .copied()
        .map(Quaternion::from)
        .unwrap_or_default();
    let mut ahrs = config.build_ahrs(sim.frequency, initial);
    let orientation = ahrs.filter(&samples)?;

    let estimates: Vec<_> = orientation.iter().map(Quaternion::to_unit_quaternion).collect();
    // the estimate after sample i describes the pose at i + 1
    let pairs = || estimates.iter().zip(sim.orientation.iter().skip(1));
    let tilt_error = ErrorStats::from_errors(pairs().map(|(e, t)| tilt_angle(e, t)));
    let attitude_error = ErrorStats::from_errors(pairs().map(|(e, t)| attitude_angle(e, t)));

    info!(
        samples = orientation.len(),
        ahrs = ?config.ahrs,
        tilt_rmse = tilt_error.rmse,
        attitude_rmse = attitude_error.rmse,
        "orientation filter run complete"
    );

    Ok(OrientationRun {
        time: data.time.clone(),
        orientation,
        tilt_error,
        attitude_error,
    })
}
