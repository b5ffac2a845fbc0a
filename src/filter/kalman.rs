//! Discount-weighted Kalman recursions with online variance learning.
//!
//! The engine is stateless apart from its discount configuration: every
//! operation reads and writes the [`StateSpaceModel`] it is handed.

use crate::components::validate_discount;
use crate::error::{DlmError, Result};
use crate::linalg::{pinv, sample_mvn, symmetrize};
use crate::model::StateSpaceModel;
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use std::ops::Range;

/// How the evolution variance `W` is assembled from the discount factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InnovationMode {
    /// Discount the whole propagated covariance, cross-component terms included.
    #[default]
    Whole,
    /// Discount each component block separately; cross-block terms of `W` are zero.
    Component,
}

/// Kalman filter, smoother and sampler for dynamic linear models.
///
/// The evolution variance follows the discount rule
/// `W = Λ·P·Λ − P` with `Λ = diag(1/√δ)` and `P = T·C·Tᵗ`, so the prior
/// covariance is inflated by exactly `1/δ` and never shrinks.
///
/// # Example
/// ```
/// use anofox_dlm::filter::KalmanFilter;
/// use anofox_dlm::model::StateSpaceModel;
/// use nalgebra::{DMatrix, DVector};
///
/// let mut model = StateSpaceModel::new(
///     DMatrix::identity(1, 1),
///     DVector::from_element(1, 1.0),
///     DVector::zeros(1),
///     DMatrix::identity(1, 1),
///     1.0,
/// )
/// .unwrap();
///
/// let kf = KalmanFilter::new(&[1.0]).unwrap();
/// kf.forward_filter(&mut model, Some(1.0));
/// assert!((model.state[0] - 0.5).abs() < 1e-12);
/// assert!((model.sys_var[(0, 0)] - 0.375).abs() < 1e-12);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct KalmanFilter {
    /// `1/√δ` per latent dimension, or a single shared value.
    scale: DVector<f64>,
    mode: InnovationMode,
    /// Component id of each latent dimension, used in component mode.
    block_of: Vec<usize>,
}

impl KalmanFilter {
    /// Create a filter from one discount or one discount per latent dimension.
    pub fn new(discount: &[f64]) -> Result<Self> {
        Ok(Self {
            scale: Self::scale_from(discount)?,
            mode: InnovationMode::Whole,
            block_of: Vec::new(),
        })
    }

    /// Select the innovation mode; `blocks` gives each component's index range.
    pub fn with_innovation(mut self, mode: InnovationMode, blocks: &[Range<usize>]) -> Self {
        self.mode = mode;
        let n = blocks.iter().map(|b| b.end).max().unwrap_or(0);
        self.block_of = vec![0; n];
        for (id, block) in blocks.iter().enumerate() {
            for i in block.clone() {
                self.block_of[i] = id;
            }
        }
        self
    }

    fn scale_from(discount: &[f64]) -> Result<DVector<f64>> {
        if discount.is_empty() {
            return Err(DlmError::InvalidParameter("discount must not be empty".into()));
        }
        let scale = discount
            .iter()
            .map(|&d| validate_discount(d).map(|d| 1.0 / d.sqrt()))
            .collect::<Result<Vec<_>>>()?;
        Ok(DVector::from_vec(scale))
    }

    /// Revalidate and replace the discount factors.
    pub fn update_discount(&mut self, discount: &[f64]) -> Result<()> {
        self.scale = Self::scale_from(discount)?;
        Ok(())
    }

    /// Current discount factors.
    pub fn discount(&self) -> Vec<f64> {
        self.scale.iter().map(|s| 1.0 / (s * s)).collect()
    }

    pub fn mode(&self) -> InnovationMode {
        self.mode
    }

    /// Check that the discount configuration fits a model of dimension `n`.
    pub fn check_dimension(&self, n: usize) -> Result<()> {
        if self.scale.len() != 1 && self.scale.len() != n {
            return Err(DlmError::DimensionMismatch(format!(
                "{} discounts for a model of dimension {}",
                self.scale.len(),
                n
            )));
        }
        if self.mode == InnovationMode::Component && self.block_of.len() != n {
            return Err(DlmError::DimensionMismatch(format!(
                "component blocks cover {} dimensions, model has {}",
                self.block_of.len(),
                n
            )));
        }
        Ok(())
    }

    fn lambda(&self, i: usize) -> f64 {
        if self.scale.len() == 1 {
            self.scale[0]
        } else {
            self.scale[i]
        }
    }

    /// Evolution variance `W` for a propagated covariance `P`.
    pub fn innovation(&self, propagated: &DMatrix<f64>) -> DMatrix<f64> {
        let n = propagated.nrows();
        DMatrix::from_fn(n, n, |i, j| {
            let coupled = match self.mode {
                InnovationMode::Whole => true,
                InnovationMode::Component => self.block_of[i] == self.block_of[j],
            };
            if coupled {
                propagated[(i, j)] * (self.lambda(i) * self.lambda(j) - 1.0)
            } else {
                0.0
            }
        })
    }

    /// Advance the forecast sub-state by `steps`.
    ///
    /// The first step starts from the committed state; later steps (and later
    /// calls, until the forecast is reset) chain off the forecast sub-state.
    pub fn predict(&self, model: &mut StateSpaceModel, steps: usize) {
        for _ in 0..steps {
            let (state, sys_var) = if model.forecast.step == 0 {
                (&model.state, &model.sys_var)
            } else {
                (&model.forecast.state, &model.forecast.sys_var)
            };

            let next_state = &model.transition * state;
            let propagated = &model.transition * sys_var * model.transition.transpose();
            let next_var = symmetrize(&(&propagated + self.innovation(&propagated)));

            model.forecast.obs = model.evaluation.dot(&next_state);
            model.forecast.obs_var =
                (&next_var * &model.evaluation).dot(&model.evaluation) + model.noise_var;
            model.forecast.state = next_state;
            model.forecast.sys_var = next_var;
            model.forecast.step += 1;
        }
    }

    /// One forward-filter update with observation `y` (`None` when missing).
    ///
    /// A missing observation carries the one-step prediction forward as the
    /// posterior. Otherwise the state is updated and the observation variance
    /// is re-estimated from the prediction error.
    pub fn forward_filter(&self, model: &mut StateSpaceModel, y: Option<f64>) {
        self.predict(model, 1);

        match y {
            None => {
                model.state = model.forecast.state.clone();
                model.sys_var = model.forecast.sys_var.clone();
                model.obs = model.forecast.obs;
                model.obs_var = model.forecast.obs_var;
            }
            Some(y) => {
                let prior = &model.forecast;
                let error = y - prior.obs;
                let gain = &prior.sys_var * &model.evaluation / prior.obs_var;

                model.state = &prior.state + &gain * error;
                model.df += 1.0;

                let prior_noise = model.noise_var;
                model.noise_var = prior_noise
                    * (1.0 - 1.0 / model.df + error * error / (model.df * prior.obs_var));

                let shrunk = &prior.sys_var - &gain * gain.transpose() * prior.obs_var;
                model.sys_var = symmetrize(&(shrunk * (model.noise_var / prior_noise)));
                model.initialize_observation();
            }
        }

        model.forecast.step = 0;
    }

    /// Smoothed mean and covariance at `t` from the model holding the `t+1`
    /// smoothed estimate and the `t+1` one-step prediction.
    fn smoothed_moments(
        &self,
        model: &StateSpaceModel,
        raw_state: &DVector<f64>,
        raw_sys_var: &DMatrix<f64>,
    ) -> Result<(DVector<f64>, DMatrix<f64>)> {
        let gain = raw_sys_var * model.transition.transpose() * pinv(&model.forecast.sys_var)?;
        let state = raw_state + &gain * (&model.state - &model.forecast.state);
        let sys_var =
            raw_sys_var + &gain * (&model.sys_var - &model.forecast.sys_var) * gain.transpose();
        Ok((state, symmetrize(&sys_var)))
    }

    /// One Rauch-Tung-Striebel backward step.
    ///
    /// On entry the model holds the smoothed estimate at `t+1` in
    /// `state`/`sys_var` and the one-step prediction for `t+1` in the forecast
    /// sub-state; `raw_state`/`raw_sys_var` are the filtered estimate at `t`.
    /// On exit the model holds the smoothed estimate at `t`.
    pub fn backward_smoother(
        &self,
        model: &mut StateSpaceModel,
        raw_state: &DVector<f64>,
        raw_sys_var: &DMatrix<f64>,
    ) -> Result<()> {
        let (state, sys_var) = self.smoothed_moments(model, raw_state, raw_sys_var)?;
        model.state = state;
        model.sys_var = sys_var;
        model.initialize_observation();
        Ok(())
    }

    /// One backward-sampling step (forward filtering, backward sampling).
    ///
    /// Same inputs as [`KalmanFilter::backward_smoother`], but the state is
    /// drawn from the smoothed distribution and the observation from
    /// `N(E·θ, noise_var)`. The drawn state is exact, so the covariance
    /// carried to the next (earlier) step is zero.
    pub fn backward_sampler<R: Rng + ?Sized>(
        &self,
        model: &mut StateSpaceModel,
        raw_state: &DVector<f64>,
        raw_sys_var: &DMatrix<f64>,
        rng: &mut R,
    ) -> Result<()> {
        let (mean, cov) = self.smoothed_moments(model, raw_state, raw_sys_var)?;
        let draw = sample_mvn(&mean, &cov, rng)?;
        let noise: f64 = StandardNormal.sample(rng);

        let n = draw.len();
        model.obs = model.evaluation.dot(&draw) + model.noise_var.sqrt() * noise;
        model.obs_var = model.noise_var;
        model.state = draw;
        model.sys_var = DMatrix::zeros(n, n);
        Ok(())
    }
}
