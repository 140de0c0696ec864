//! Accelerometer dead-reckoning with zero-velocity updates.
//!
//! Raw samples (in g) are classified by a [`StaticDetector`]. The gravity
//! estimate is subtracted and the remainder scaled to m/s² before it is fed
//! to a 9-state constant-acceleration [`KalmanFilter`]. While the detector
//! reports the sensor as static, velocity is forced to zero and position is
//! frozen at its value on entry to the current step, before prediction,
//! after prediction and after the update.

use nalgebra::{SMatrix, SVector, Vector3};
use tracing::warn;

use crate::error::Result;
use crate::kalman::{
    acceleration_observation, constant_acceleration_transition, layout, CovarianceUpdate,
    KalmanFilter, KalmanState, StateSpaceModel,
};
use crate::static_detector::{
    Motion, StaticDetector, StaticDetectorConfig, DEFAULT_STATIC_TIME, DEFAULT_THRESHOLD,
};

/// Standard gravity (m/s²) used to scale observations given in g.
pub const GRAVITY: f64 = 9.81;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionFilterConfig {
    /// Sampling frequency (Hz).
    pub frequency: f64,
    pub threshold: f64,
    pub static_time: f64,
    pub start_static: bool,
    /// Diagonal of Q.
    pub process_noise: f64,
    /// Diagonal of R.
    pub observation_noise: f64,
    pub covariance_update: CovarianceUpdate,
}

impl PositionFilterConfig {
    pub fn new(frequency: f64) -> Self {
        Self {
            frequency,
            threshold: DEFAULT_THRESHOLD,
            static_time: DEFAULT_STATIC_TIME,
            start_static: false,
            process_noise: 1.0,
            observation_noise: 20.0,
            covariance_update: CovarianceUpdate::default(),
        }
    }

    fn detector_config(&self) -> StaticDetectorConfig {
        StaticDetectorConfig {
            frequency: self.frequency,
            threshold: self.threshold,
            static_time: self.static_time,
            start_static: self.start_static,
        }
    }

    fn model(&self) -> StateSpaceModel<9, 3> {
        StateSpaceModel::new(
            constant_acceleration_transition(self.frequency),
            SMatrix::from_diagonal_element(self.process_noise),
            acceleration_observation(),
            SMatrix::from_diagonal_element(self.observation_noise),
        )
    }
}

// ---------------------------------------------------------------------------
// STATE VIEWS
// ---------------------------------------------------------------------------

fn sub_vector(mean: &SVector<f64, 9>, offset: usize) -> Vector3<f64> {
    mean.fixed_rows::<3>(offset).into_owned()
}

impl KalmanState<9> {
    pub fn acceleration(&self) -> Vector3<f64> {
        sub_vector(&self.mean, layout::ACCELERATION)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        sub_vector(&self.mean, layout::VELOCITY)
    }

    pub fn position(&self) -> Vector3<f64> {
        sub_vector(&self.mean, layout::POSITION)
    }

    /// Copy of `self` with velocity zeroed and position replaced.
    pub fn pinned(&self, position: &Vector3<f64>) -> Self {
        let mut mean = self.mean;
        mean.fixed_rows_mut::<3>(layout::VELOCITY).fill(0.0);
        mean.fixed_rows_mut::<3>(layout::POSITION)
            .copy_from(position);
        self.with_mean(mean)
    }
}

/// Filter output for one sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PositionRecord {
    pub state: SVector<f64, 9>,
    pub motion: Motion,
    /// Gravity estimate (g) used for this sample.
    pub gravity: Vector3<f64>,
}

impl PositionRecord {
    pub fn acceleration(&self) -> Vector3<f64> {
        sub_vector(&self.state, layout::ACCELERATION)
    }

    pub fn velocity(&self) -> Vector3<f64> {
        sub_vector(&self.state, layout::VELOCITY)
    }

    pub fn position(&self) -> Vector3<f64> {
        sub_vector(&self.state, layout::POSITION)
    }
}

/// Column-wise output of [`StaticDetectingPositionFilter::filter`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PositionTrajectory {
    pub states: Vec<SVector<f64, 9>>,
    /// 1 static, 0.5 settling, 0 moving; see [`Motion::mask_value`].
    pub static_mask: Vec<f64>,
    pub gravity: Vec<Vector3<f64>>,
}

impl PositionTrajectory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: Vec::with_capacity(capacity),
            static_mask: Vec::with_capacity(capacity),
            gravity: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: &PositionRecord) {
        self.states.push(record.state);
        self.static_mask.push(record.motion.mask_value());
        self.gravity.push(record.gravity);
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = Vector3<f64>> + '_ {
        self.states
            .iter()
            .map(|s| sub_vector(s, layout::POSITION))
    }
}

// ---------------------------------------------------------------------------
// FILTER
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct StaticDetectingPositionFilter {
    kalman: KalmanFilter<9, 3>,
    detector: StaticDetector,
    frozen_position: Option<Vector3<f64>>,
}

impl StaticDetectingPositionFilter {
    /// Filter with default threshold (0.1 g) and static time (0.25 s).
    pub fn new(frequency: f64) -> Self {
        Self::with_config(PositionFilterConfig::new(frequency))
    }

    pub fn with_config(config: PositionFilterConfig) -> Self {
        let kalman = KalmanFilter::new(config.model())
            .with_covariance_update(config.covariance_update);
        Self {
            kalman,
            detector: StaticDetector::new(config.detector_config()),
            frozen_position: None,
        }
    }

    pub fn kalman(&self) -> &KalmanFilter<9, 3> {
        &self.kalman
    }

    pub fn detector(&self) -> &StaticDetector {
        &self.detector
    }

    pub fn is_static(&self) -> bool {
        self.detector.is_static()
    }

    fn pin(&self, state: KalmanState<9>) -> KalmanState<9> {
        match self.frozen_position {
            Some(position) if self.detector.is_static() => state.pinned(&position),
            _ => state,
        }
    }

    /// Processes one raw sample (in g).
    ///
    /// On a numerical failure the detector has already consumed the sample
    /// but the Kalman state is left as it was.
    pub fn step(&mut self, observation: &Vector3<f64>) -> Result<PositionRecord> {
        let class = self.detector.classify(observation);

        let mut state = *self.kalman.state();
        if class.motion == Motion::Static {
            let position = state.position();
            state = state.pinned(&position);
            self.frozen_position = Some(position);
        } else {
            self.frozen_position = None;
        }

        let predicted = self.pin(self.kalman.predict(&state));
        let compensated = (observation - class.gravity) * GRAVITY;
        let update = self.kalman.update(&predicted, &compensated)?;
        let corrected = self.pin(update.state);
        self.kalman.set_state(corrected);

        Ok(PositionRecord {
            state: corrected.mean,
            motion: class.motion,
            gravity: class.gravity,
        })
    }

    /// Runs [`step`](Self::step) over a whole recording. Stops at the first
    /// failing sample.
    pub fn filter(&mut self, observations: &[Vector3<f64>]) -> Result<PositionTrajectory> {
        let mut trajectory = PositionTrajectory::with_capacity(observations.len());
        for (index, observation) in observations.iter().enumerate() {
            match self.step(observation) {
                Ok(record) => trajectory.push(&record),
                Err(err) => {
                    warn!(index, %err, "position update failed");
                    return Err(err);
                }
            }
        }
        Ok(trajectory)
    }
}
