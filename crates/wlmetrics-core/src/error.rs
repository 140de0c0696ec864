//! Error type shared by every estimator in the crate.

use thiserror::Error;

/// Result alias used across the core crate.
pub type Result<T> = core::result::Result<T, FusionError>;

/// Numerical precondition violations raised by the estimators.
///
/// None of these are transient: retrying the same step with the same
/// inputs fails the same way, so callers decide whether to abort or skip.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FusionError {
    /// A fixed-size value was built from a slice of the wrong length.
    #[error("invalid dimension: expected {expected} values, found {found}")]
    InvalidDimension { expected: usize, found: usize },

    /// Arithmetic between a quaternion and an operand it is not defined for.
    #[error("unsupported operand: cannot {op} quaternion and {operand}")]
    UnsupportedOperand {
        op: &'static str,
        operand: &'static str,
    },

    /// The operation is undefined for the current value, e.g. normalizing
    /// a zero quaternion.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The innovation covariance of a Kalman update could not be inverted.
    #[error("innovation covariance is singular")]
    SingularCovariance,
}
