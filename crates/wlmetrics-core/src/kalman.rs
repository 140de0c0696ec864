//! Discrete-time linear Kalman filter over a fixed state-space model.
//!
//! The model is `x' = A·x + w`, `y = C·x + v` with `w ~ N(0, Q)` and
//! `v ~ N(0, R)`. State dimension `N` and observation dimension `M` are
//! const generics, so a model is checked for shape at compile time.

use nalgebra::{SMatrix, SVector};
use tracing::warn;

use crate::error::{FusionError, Result};

// ---------------------------------------------------------------------------
// MODEL
// ---------------------------------------------------------------------------

/// Offsets of the three 3-vectors in the constant-acceleration state.
pub mod layout {
    pub const ACCELERATION: usize = 0;
    pub const VELOCITY: usize = 3;
    pub const POSITION: usize = 6;
}

pub type KinematicModel = StateSpaceModel<9, 3>;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StateSpaceModel<const N: usize, const M: usize> {
    /// A
    pub transition: SMatrix<f64, N, N>,
    /// Q
    pub transition_covariance: SMatrix<f64, N, N>,
    /// C
    pub observation: SMatrix<f64, M, N>,
    /// R
    pub observation_covariance: SMatrix<f64, M, M>,
}

impl<const N: usize, const M: usize> StateSpaceModel<N, M> {
    pub fn new(
        transition: SMatrix<f64, N, N>,
        transition_covariance: SMatrix<f64, N, N>,
        observation: SMatrix<f64, M, N>,
        observation_covariance: SMatrix<f64, M, M>,
    ) -> Self {
        Self {
            transition,
            transition_covariance,
            observation,
            observation_covariance,
        }
    }
}

/// Transition matrix of the 9-state constant-acceleration chain:
/// velocity integrates acceleration and position integrates velocity over
/// one sample period `1 / frequency`.
pub fn constant_acceleration_transition(frequency: f64) -> SMatrix<f64, 9, 9> {
    let dt = 1.0 / frequency;
    let mut a = SMatrix::<f64, 9, 9>::identity();
    a.fixed_view_mut::<3, 3>(layout::VELOCITY, layout::ACCELERATION)
        .fill_diagonal(dt);
    a.fixed_view_mut::<3, 3>(layout::POSITION, layout::VELOCITY)
        .fill_diagonal(dt);
    a
}

/// Observation matrix picking the three acceleration states.
pub fn acceleration_observation() -> SMatrix<f64, 3, 9> {
    let mut c = SMatrix::<f64, 3, 9>::zeros();
    c.fixed_view_mut::<3, 3>(0, layout::ACCELERATION)
        .fill_diagonal(1.0);
    c
}

/// Constant-acceleration model for a raw accelerometer stream sampled at
/// `frequency` Hz, with diagonal process noise 0.05 and observation noise 2.
pub fn accelerometer_filter_matrices(frequency: f64) -> KinematicModel {
    StateSpaceModel::new(
        constant_acceleration_transition(frequency),
        SMatrix::<f64, 9, 9>::identity() * 0.05,
        acceleration_observation(),
        SMatrix::<f64, 3, 3>::identity() * 2.0,
    )
}

// ---------------------------------------------------------------------------
// STATE
// ---------------------------------------------------------------------------

/// Mean `X` and covariance `P` of the state estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KalmanState<const N: usize> {
    pub mean: SVector<f64, N>,
    pub covariance: SMatrix<f64, N, N>,
}

impl<const N: usize> KalmanState<N> {
    pub fn new(mean: SVector<f64, N>, covariance: SMatrix<f64, N, N>) -> Self {
        Self { mean, covariance }
    }

    pub fn zeros() -> Self {
        Self::new(SVector::zeros(), SMatrix::zeros())
    }

    /// Copy of `self` with the mean replaced.
    pub fn with_mean(&self, mean: SVector<f64, N>) -> Self {
        Self::new(mean, self.covariance)
    }
}

impl<const N: usize> Default for KalmanState<N> {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Predictive distribution of the next observation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Innovation<const M: usize> {
    /// IM = C·X
    pub mean: SVector<f64, M>,
    /// IS = C·P·Cᵗ + R
    pub covariance: SMatrix<f64, M, M>,
}

impl<const M: usize> Innovation<M> {
    /// Gaussian log-density of `observation` under this distribution.
    pub fn log_likelihood(&self, observation: &SVector<f64, M>) -> Result<f64> {
        let cholesky = self
            .covariance
            .cholesky()
            .ok_or(FusionError::SingularCovariance)?;
        let residual = observation - self.mean;
        let mahalanobis = residual.dot(&cholesky.solve(&residual));
        let log_det = 2.0 * cholesky.l().diagonal().map(f64::ln).sum();
        let log_two_pi = (2.0 * core::f64::consts::PI).ln();
        Ok(-0.5 * (mahalanobis + M as f64 * log_two_pi + log_det))
    }
}

/// Everything produced by one measurement update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Update<const N: usize, const M: usize> {
    pub state: KalmanState<N>,
    pub gain: SMatrix<f64, N, M>,
    pub innovation: Innovation<M>,
}

/// How the posterior covariance is formed after an update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CovarianceUpdate {
    /// `P − K·IS·Kᵗ`
    Simple,
    /// The simple form followed by `(P + Pᵗ) / 2`.
    #[default]
    Symmetrized,
    /// `(I − K·C)·P·(I − K·C)ᵗ + K·R·Kᵗ`
    Joseph,
}

// ---------------------------------------------------------------------------
// FILTER
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct KalmanFilter<const N: usize, const M: usize> {
    model: StateSpaceModel<N, M>,
    covariance_update: CovarianceUpdate,
    state: KalmanState<N>,
}

impl<const N: usize, const M: usize> KalmanFilter<N, M> {
    /// Filter starting from a zero mean and zero covariance.
    pub fn new(model: StateSpaceModel<N, M>) -> Self {
        Self {
            model,
            covariance_update: CovarianceUpdate::default(),
            state: KalmanState::zeros(),
        }
    }

    pub fn with_covariance_update(mut self, covariance_update: CovarianceUpdate) -> Self {
        self.covariance_update = covariance_update;
        self
    }

    pub fn set_initial_state(&mut self, mean: SVector<f64, N>, covariance: SMatrix<f64, N, N>) {
        self.state = KalmanState::new(mean, covariance);
    }

    pub fn model(&self) -> &StateSpaceModel<N, M> {
        &self.model
    }

    pub fn state(&self) -> &KalmanState<N> {
        &self.state
    }

    /// Replaces the running state, e.g. after an external correction.
    pub fn set_state(&mut self, state: KalmanState<N>) {
        self.state = state;
    }

    /// `X' = A·X`, `P' = A·P·Aᵗ + Q`.
    pub fn predict(&self, state: &KalmanState<N>) -> KalmanState<N> {
        let a = &self.model.transition;
        KalmanState::new(
            a * state.mean,
            a * state.covariance * a.transpose() + self.model.transition_covariance,
        )
    }

    /// Innovation mean and covariance for `state`.
    pub fn innovation(&self, state: &KalmanState<N>) -> Innovation<M> {
        let c = &self.model.observation;
        Innovation {
            mean: c * state.mean,
            covariance: c * state.covariance * c.transpose() + self.model.observation_covariance,
        }
    }

    /// Corrects `state` with `observation`.
    ///
    /// Fails with [`FusionError::SingularCovariance`] when the innovation
    /// covariance has no inverse.
    pub fn update(
        &self,
        state: &KalmanState<N>,
        observation: &SVector<f64, M>,
    ) -> Result<Update<N, M>> {
        let c = &self.model.observation;
        let innovation = self.innovation(state);
        let is_inv = innovation
            .covariance
            .try_inverse()
            .ok_or(FusionError::SingularCovariance)?;

        let gain = state.covariance * c.transpose() * is_inv;
        let mean = state.mean + gain * (observation - innovation.mean);

        let p = &state.covariance;
        let covariance = match self.covariance_update {
            CovarianceUpdate::Simple => p - gain * innovation.covariance * gain.transpose(),
            CovarianceUpdate::Symmetrized => {
                let p_post = p - gain * innovation.covariance * gain.transpose();
                (p_post + p_post.transpose()) * 0.5
            }
            CovarianceUpdate::Joseph => {
                let i_kc = SMatrix::<f64, N, N>::identity() - gain * c;
                i_kc * p * i_kc.transpose()
                    + gain * self.model.observation_covariance * gain.transpose()
            }
        };

        Ok(Update {
            state: KalmanState::new(mean, covariance),
            gain,
            innovation,
        })
    }

    /// One predict/update cycle on the running state.
    pub fn step(&mut self, observation: &SVector<f64, M>) -> Result<&KalmanState<N>> {
        let predicted = self.predict(&self.state);
        let update = self.update(&predicted, observation)?;
        self.state = update.state;
        Ok(&self.state)
    }

    /// Runs [`step`](Self::step) over every observation in order and returns
    /// the mean after each one.
    pub fn filter(&mut self, observations: &[SVector<f64, M>]) -> Result<Vec<SVector<f64, N>>> {
        let mut states = Vec::with_capacity(observations.len());
        for (index, observation) in observations.iter().enumerate() {
            match self.step(observation) {
                Ok(state) => states.push(state.mean),
                Err(err) => {
                    warn!(index, %err, "kalman update failed");
                    return Err(err);
                }
            }
        }
        Ok(states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Matrix2, Matrix3, RowVector2, Vector2, Vector3};

    const FREQ: f64 = 200.0;

    fn noiseless_kinematic_model(observation_noise: f64) -> KinematicModel {
        StateSpaceModel::new(
            constant_acceleration_transition(FREQ),
            SMatrix::zeros(),
            acceleration_observation(),
            Matrix3::identity() * observation_noise,
        )
    }

    #[test]
    fn test_transition_chain_layout() {
        let a = constant_acceleration_transition(FREQ);
        let dt = 1.0 / FREQ;
        assert_eq!(a[(layout::VELOCITY, layout::ACCELERATION)], dt);
        assert_eq!(a[(layout::POSITION + 2, layout::VELOCITY + 2)], dt);
        assert_eq!(a[(layout::ACCELERATION, layout::VELOCITY)], 0.0);
        assert_eq!(a.diagonal(), SVector::<f64, 9>::repeat(1.0));

        let c = acceleration_observation();
        let mut x = SVector::<f64, 9>::zeros();
        x.fixed_rows_mut::<3>(layout::ACCELERATION)
            .copy_from(&Vector3::new(1.0, 2.0, 3.0));
        x[layout::VELOCITY] = 10.0;
        assert_eq!(c * x, Vector3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_predict_matches_definition() {
        let model = accelerometer_filter_matrices(FREQ);
        let kf = KalmanFilter::new(model);
        let mut mean = SVector::<f64, 9>::zeros();
        mean[0] = 2.0;
        mean[3] = 1.0;
        let state = KalmanState::new(mean, SMatrix::identity());
        let predicted = kf.predict(&state);

        assert_relative_eq!(predicted.mean[3], 1.0 + 2.0 / FREQ, epsilon = 1e-15);
        assert_relative_eq!(predicted.mean[6], 1.0 / FREQ, epsilon = 1e-15);
        let expected_p = model.transition * model.transition.transpose() + model.transition_covariance;
        assert_relative_eq!(predicted.covariance, expected_p, epsilon = 1e-15);
    }

    #[test]
    fn test_update_scalar_case() {
        // 1-D random constant: prior N(0, 4), observation noise 1.
        let model = StateSpaceModel::<1, 1>::new(
            SMatrix::identity(),
            SMatrix::zeros(),
            SMatrix::identity(),
            SMatrix::identity(),
        );
        let kf = KalmanFilter::new(model);
        let prior = KalmanState::new(SVector::<f64, 1>::new(0.0), SMatrix::<f64, 1, 1>::new(4.0));
        let update = kf.update(&prior, &SVector::<f64, 1>::new(5.0)).unwrap();

        assert_relative_eq!(update.gain[(0, 0)], 0.8, epsilon = 1e-15);
        assert_relative_eq!(update.state.mean[0], 4.0, epsilon = 1e-15);
        assert_relative_eq!(update.state.covariance[(0, 0)], 0.8, epsilon = 1e-15);
        assert_relative_eq!(update.innovation.covariance[(0, 0)], 5.0, epsilon = 1e-15);
        assert_eq!(update.innovation.mean[0], 0.0);
    }

    #[test]
    fn test_covariance_update_forms_agree_for_optimal_gain() {
        let model = StateSpaceModel::<2, 1>::new(
            Matrix2::new(1.0, 0.1, 0.0, 1.0),
            Matrix2::identity() * 0.01,
            RowVector2::new(1.0, 0.0),
            SMatrix::<f64, 1, 1>::new(0.5),
        );
        let prior = KalmanState::new(Vector2::new(0.3, -0.2), Matrix2::new(2.0, 0.3, 0.3, 1.0));
        let y = SVector::<f64, 1>::new(1.0);

        let results: Vec<_> = [
            CovarianceUpdate::Simple,
            CovarianceUpdate::Symmetrized,
            CovarianceUpdate::Joseph,
        ]
        .into_iter()
        .map(|form| {
            KalmanFilter::new(model)
                .with_covariance_update(form)
                .update(&prior, &y)
                .unwrap()
                .state
        })
        .collect();

        for pair in results.windows(2) {
            assert_relative_eq!(pair[0].mean, pair[1].mean, epsilon = 1e-12);
            assert_relative_eq!(pair[0].covariance, pair[1].covariance, epsilon = 1e-12);
        }
        let p = results[1].covariance;
        assert_eq!(p, p.transpose());
    }

    #[test]
    fn test_singular_innovation_covariance_is_reported() {
        let mut kf = KalmanFilter::new(noiseless_kinematic_model(0.0));
        let y = Vector3::new(1.0, 0.0, 0.0);
        assert_eq!(kf.step(&y).unwrap_err(), FusionError::SingularCovariance);
        assert_eq!(
            kf.filter(&[y, y]).unwrap_err(),
            FusionError::SingularCovariance
        );
        // the running state is not touched by a failed step
        assert_eq!(kf.state(), &KalmanState::zeros());
    }

    #[test]
    fn test_round_trip_reproduces_simulated_truth() {
        // Noise-free model and observations generated by running the model
        // forward: the innovation is identically zero, so the estimate
        // tracks the simulated state exactly.
        let model = noiseless_kinematic_model(1.0);
        let mut truth = SVector::<f64, 9>::zeros();
        truth.fixed_rows_mut::<3>(layout::ACCELERATION)
            .copy_from(&Vector3::new(0.5, -1.0, 2.0));
        truth.fixed_rows_mut::<3>(layout::VELOCITY)
            .copy_from(&Vector3::new(0.1, 0.0, -0.3));

        let mut simulated = Vec::new();
        let mut observations = Vec::new();
        let mut x = truth;
        for _ in 0..400 {
            x = model.transition * x;
            simulated.push(x);
            observations.push(model.observation * x);
        }

        let mut kf = KalmanFilter::new(model);
        kf.set_initial_state(truth, SMatrix::identity());
        let states = kf.filter(&observations).unwrap();

        assert_eq!(states.len(), simulated.len());
        for (estimate, expected) in states.iter().zip(simulated.iter()) {
            assert_relative_eq!(estimate, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_constant_acceleration_without_process_noise() {
        let model = noiseless_kinematic_model(2.0);
        let mut initial = SVector::<f64, 9>::zeros();
        initial[layout::ACCELERATION] = 1.0;
        let mut kf = KalmanFilter::new(model);
        kf.set_initial_state(initial, SMatrix::identity());

        let observations = vec![Vector3::new(1.0, 0.0, 0.0); 200];
        let states = kf.filter(&observations).unwrap();
        let last = states.last().unwrap();

        assert_relative_eq!(last[layout::VELOCITY], 1.0, epsilon = 1e-9);
        assert_relative_eq!(last[layout::VELOCITY + 1], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_acceleration_from_rest_with_process_noise() {
        let mut kf = KalmanFilter::new(accelerometer_filter_matrices(FREQ));
        kf.set_initial_state(SVector::zeros(), SMatrix::identity() * 100.0);

        let observations = vec![Vector3::new(1.0, 0.0, 0.0); 200];
        let states = kf.filter(&observations).unwrap();
        let last = states.last().unwrap();

        assert_relative_eq!(last[layout::ACCELERATION], 1.0, epsilon = 1e-3);
        assert!(
            (last[layout::VELOCITY] - 1.0).abs() < 0.05,
            "velocity after 1 s was {}",
            last[layout::VELOCITY]
        );
        assert_relative_eq!(last[layout::VELOCITY + 2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_log_likelihood_standard_normal() {
        let innovation = Innovation::<1> {
            mean: SVector::<f64, 1>::new(0.0),
            covariance: SMatrix::<f64, 1, 1>::new(1.0),
        };
        let at_mean = innovation.log_likelihood(&SVector::<f64, 1>::new(0.0)).unwrap();
        let expected = -0.5 * (2.0 * core::f64::consts::PI).ln();
        assert_relative_eq!(at_mean, expected, epsilon = 1e-12);

        let one_sigma = innovation.log_likelihood(&SVector::<f64, 1>::new(1.0)).unwrap();
        assert_relative_eq!(one_sigma, expected - 0.5, epsilon = 1e-12);

        let degenerate = Innovation::<1> {
            mean: SVector::<f64, 1>::new(0.0),
            covariance: SMatrix::<f64, 1, 1>::new(0.0),
        };
        assert!(degenerate.log_likelihood(&SVector::<f64, 1>::new(0.0)).is_err());
    }
}
