//! wlmetrics simulation library
//!
//! Generates synthetic IMU sessions with known ground truth and runs the
//! core filters over them.

pub mod error;
pub mod filter;
pub mod params;
pub mod sensor;
pub mod sim;

// Re-export main types
pub use error::{Result, SimError};
pub use filter::{
    run_orientation_filter, run_position_filter, AhrsKind, CovarianceForm, ErrorStats,
    FilterConfig, OrientationRun, PositionRun,
};
pub use params::ParamSpec;
pub use sensor::{generate_sensor_data, SensorConfig, SensorData};
pub use sim::{simulate, ScenarioParams, Segment, SimResult};
