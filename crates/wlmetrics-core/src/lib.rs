//! # wlmetrics core
//!
//! Inertial sensor fusion for wearable IMU recordings:
//! - Quaternion algebra
//! - Generic linear Kalman filter
//! - Static-interval detection and zero-velocity-updated position tracking
//! - AHRS orientation filters (Madgwick, Mahony)
//!
//! Every estimator is a sequential running-state machine: one output per
//! input sample, no I/O.

pub mod ahrs;
pub mod error;
pub mod intervals;
pub mod kalman;
pub mod position;
pub mod quaternion;
pub mod static_detector;

// Re-export core types
pub use ahrs::{Ahrs, ImuSample, MadgwickFilter, MadgwickParams, MahonyFilter, MahonyParams};
pub use error::{FusionError, Result};
pub use kalman::{
    accelerometer_filter_matrices, CovarianceUpdate, KalmanFilter, KalmanState, StateSpaceModel,
};
pub use position::{
    PositionFilterConfig, PositionRecord, PositionTrajectory, StaticDetectingPositionFilter,
    GRAVITY,
};
pub use quaternion::{Operand, Quaternion};
pub use static_detector::{Motion, StaticDetector, StaticDetectorConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
