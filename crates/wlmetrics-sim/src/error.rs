use thiserror::Error;
use wlmetrics_core::FusionError;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Fusion(#[from] FusionError),

    #[error("invalid noise parameter: {0}")]
    Noise(#[from] rand_distr::NormalError),

    #[error("{label} = {value} is outside [{min}, {max}]")]
    OutOfRange {
        label: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("invalid filter config: {0}")]
    Config(#[from] serde_json::Error),

    #[error("sensor data ({sensor}) does not match simulation ({sim} samples)")]
    LengthMismatch { sensor: usize, sim: usize },
}
