//! The assembled state-space model and its forecast scratch area.

use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};

/// Scratch state for multi-step prediction.
///
/// Kept apart from the committed estimate so that "what-if" forecasts never
/// touch the filtered trajectory. `step` counts how many steps ahead of the
/// committed state the scratch area currently is; zero means it is unused.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastState {
    pub state: DVector<f64>,
    pub sys_var: DMatrix<f64>,
    pub obs: f64,
    pub obs_var: f64,
    pub step: usize,
}

impl ForecastState {
    fn empty(n: usize) -> Self {
        Self {
            state: DVector::zeros(n),
            sys_var: DMatrix::zeros(n, n),
            obs: 0.0,
            obs_var: 0.0,
            step: 0,
        }
    }
}

/// Current estimate of a dynamic linear model.
///
/// Observation equation `y_t = E_t·θ_t + v_t`, `v_t ~ N(0, noise_var)`;
/// state equation `θ_t = T·θ_{t-1} + w_t` with `w_t` implied by the
/// discount factors.
#[derive(Debug, Clone, PartialEq)]
pub struct StateSpaceModel {
    /// Block-diagonal transition `T`.
    pub transition: DMatrix<f64>,
    /// Concatenated evaluation vector `E_t`.
    pub evaluation: DVector<f64>,
    /// Latent state mean.
    pub state: DVector<f64>,
    /// Latent state covariance.
    pub sys_var: DMatrix<f64>,
    /// Observation variance estimate.
    pub noise_var: f64,
    /// Degrees of freedom behind `noise_var`.
    pub df: f64,
    pub obs: f64,
    pub obs_var: f64,
    pub forecast: ForecastState,
}

impl StateSpaceModel {
    /// Create a model from its prior and compute the prior observation moments.
    pub fn new(
        transition: DMatrix<f64>,
        evaluation: DVector<f64>,
        state: DVector<f64>,
        sys_var: DMatrix<f64>,
        noise_var: f64,
    ) -> Result<Self> {
        let n = state.len();
        if transition.shape() != (n, n) || sys_var.shape() != (n, n) || evaluation.len() != n {
            return Err(DlmError::DimensionMismatch(format!(
                "state has length {} but transition is {:?}, covariance is {:?}, evaluation has length {}",
                n,
                transition.shape(),
                sys_var.shape(),
                evaluation.len()
            )));
        }
        if noise_var.is_nan() || noise_var <= 0.0 {
            return Err(DlmError::InvalidParameter(format!(
                "prior noise variance must be positive, got {}",
                noise_var
            )));
        }

        let mut model = Self {
            transition,
            evaluation,
            state,
            sys_var,
            noise_var,
            df: 1.0,
            obs: 0.0,
            obs_var: 0.0,
            forecast: ForecastState::empty(n),
        };
        model.initialize_observation();
        Ok(model)
    }

    pub fn dimension(&self) -> usize {
        self.state.len()
    }

    /// Recompute `obs` and `obs_var` from the current state.
    pub fn initialize_observation(&mut self) {
        self.obs = self.evaluation.dot(&self.state);
        self.obs_var = (&self.sys_var * &self.evaluation).dot(&self.evaluation) + self.noise_var;
    }

    /// Discard any in-progress forecast so the next prediction starts from the committed state.
    pub fn reset_forecast(&mut self) {
        self.forecast.step = 0;
    }

    /// Overwrite the committed estimate, e.g. with a stored posterior.
    pub fn load(&mut self, state: DVector<f64>, sys_var: DMatrix<f64>, noise_var: f64, df: f64) {
        self.state = state;
        self.sys_var = sys_var;
        self.noise_var = noise_var;
        self.df = df;
        self.initialize_observation();
        self.reset_forecast();
    }
}
