//! Ground-truth motion from a list of piecewise-constant segments.
//!
//! World frame is z-up; orientation is body → world.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// One stretch of motion. Linear acceleration is in the world frame (m/s²),
/// angular rate in the body frame (rad/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Segment {
    Rest { duration: f64 },
    Accelerate { duration: f64, accel: [f64; 3] },
    Rotate { duration: f64, rate: [f64; 3] },
}

impl Segment {
    pub fn duration(&self) -> f64 {
        match *self {
            Self::Rest { duration }
            | Self::Accelerate { duration, .. }
            | Self::Rotate { duration, .. } => duration,
        }
    }

    fn accel(&self) -> Vector3<f64> {
        match *self {
            Self::Accelerate { accel, .. } => Vector3::from(accel),
            _ => Vector3::zeros(),
        }
    }

    fn rate(&self) -> Vector3<f64> {
        match *self {
            Self::Rotate { rate, .. } => Vector3::from(rate),
            _ => Vector3::zeros(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioParams {
    /// Sampling frequency (Hz).
    pub frequency: f64,
    pub segments: Vec<Segment>,
}

impl ScenarioParams {
    /// Standing still, a 1.5 m push along x that comes to rest, then a
    /// quarter turn about z.
    pub fn walk_and_turn(frequency: f64) -> Self {
        Self {
            frequency,
            segments: vec![
                Segment::Rest { duration: 2.0 },
                Segment::Accelerate {
                    duration: 0.5,
                    accel: [6.0, 0.0, 0.0],
                },
                Segment::Accelerate {
                    duration: 0.5,
                    accel: [-6.0, 0.0, 0.0],
                },
                Segment::Rest { duration: 2.0 },
                Segment::Rotate {
                    duration: 1.0,
                    rate: [0.0, 0.0, core::f64::consts::FRAC_PI_2],
                },
                Segment::Rest { duration: 1.0 },
            ],
        }
    }

    pub fn duration(&self) -> f64 {
        self.segments.iter().map(Segment::duration).sum()
    }
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self::walk_and_turn(100.0)
    }
}

// ---------------------------------------------------------------------------
// Simulation Result
// ---------------------------------------------------------------------------

/// Per-sample truth. Index `i` holds the state at `time[i]` and the inputs
/// applied over the following sample period.
#[derive(Debug, Clone, Default)]
pub struct SimResult {
    pub frequency: f64,
    pub time: Vec<f64>,
    pub pos: Vec<Vector3<f64>>,
    pub vel: Vec<Vector3<f64>>,
    /// Kinematic acceleration (world frame, m/s²).
    pub accel: Vec<Vector3<f64>>,
    /// Body angular rate (rad/s).
    pub ang_vel: Vec<Vector3<f64>>,
    pub orientation: Vec<UnitQuaternion<f64>>,
}

impl SimResult {
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Main Loop
// ---------------------------------------------------------------------------

pub fn simulate(params: &ScenarioParams) -> SimResult {
    let dt = 1.0 / params.frequency;
    let capacity = (params.duration() * params.frequency).round() as usize;
    let mut res = SimResult {
        frequency: params.frequency,
        time: Vec::with_capacity(capacity),
        pos: Vec::with_capacity(capacity),
        vel: Vec::with_capacity(capacity),
        accel: Vec::with_capacity(capacity),
        ang_vel: Vec::with_capacity(capacity),
        orientation: Vec::with_capacity(capacity),
    };

    let mut pos = Vector3::zeros();
    let mut vel = Vector3::zeros();
    let mut att = UnitQuaternion::identity();

    for segment in &params.segments {
        let steps = (segment.duration() * params.frequency).round() as usize;
        let accel = segment.accel();
        let rate = segment.rate();
        // rotation over one sample period, applied in the body frame
        let dq = UnitQuaternion::from_scaled_axis(rate * dt);

        for _ in 0..steps {
            res.time.push(res.time.len() as f64 * dt);
            res.pos.push(pos);
            res.vel.push(vel);
            res.accel.push(accel);
            res.ang_vel.push(rate);
            res.orientation.push(att);

            pos += vel * dt + accel * (0.5 * dt * dt);
            vel += accel * dt;
            att *= dq;
        }
    }

    res
}
