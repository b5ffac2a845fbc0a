//! Discount tuning by minimising one-step-ahead prediction error.

use crate::dlm::Dlm;
use crate::error::{DlmError, Result};
use tracing::{debug, info};

/// Configuration for [`ModelTuner`].
#[derive(Debug, Clone, PartialEq)]
pub struct TunerConfig {
    /// Maximum number of descent iterations.
    pub max_iter: usize,
    /// Initial move length in discount units (default: 0.05).
    pub initial_step: f64,
    /// Finite-difference width for the gradient (default: 1e-4).
    pub diff: f64,
    /// Lower bound for every discount (default: 0.5).
    pub min_discount: f64,
    /// Convergence tolerance on the move length and gradient norm.
    pub tolerance: f64,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            initial_step: 0.05,
            diff: 1e-4,
            min_discount: 0.5,
            tolerance: 1e-6,
        }
    }
}

impl TunerConfig {
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn with_initial_step(mut self, step: f64) -> Self {
        self.initial_step = step;
        self
    }

    pub fn with_diff(mut self, diff: f64) -> Self {
        self.diff = diff;
        self
    }

    pub fn with_min_discount(mut self, min_discount: f64) -> Self {
        self.min_discount = min_discount;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Outcome of a tuning run.
#[derive(Debug, Clone)]
pub struct TuneResult {
    /// The input model with tuned discounts, forward filtered.
    pub model: Dlm,
    /// Tuned discount per component name, in layout order.
    pub discounts: Vec<(String, f64)>,
    /// One-step-ahead MSE of the tuned model.
    pub mse: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Searches one discount per component that minimises [`Dlm::mse`].
///
/// Uses projected gradient descent on `[min_discount, 1]` with
/// finite-difference gradients, normalised moves and step halving whenever a
/// move fails to improve. Every objective evaluation runs on a clone, so the
/// input model is never modified.
///
/// # Example
/// ```
/// use anofox_dlm::prelude::*;
///
/// let data: Vec<f64> = (0..40).map(|i| (i as f64 * 0.3).sin() + 0.1 * i as f64).collect();
/// let mut dlm = Dlm::from_values(&data);
/// dlm.add(Trend::new(1, 0.9).unwrap()).unwrap();
/// dlm.fit_forward_filter().unwrap();
/// let before = dlm.mse().unwrap();
///
/// let tuned = ModelTuner::new(TunerConfig::default().with_max_iter(10)).tune(&dlm).unwrap();
/// assert!(tuned.mse <= before);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ModelTuner {
    config: TunerConfig,
}

impl ModelTuner {
    pub fn new(config: TunerConfig) -> Self {
        Self { config }
    }

    fn validate(&self) -> Result<()> {
        let c = &self.config;
        if !(c.min_discount > 0.0 && c.min_discount < 1.0) {
            return Err(DlmError::InvalidParameter(format!(
                "min_discount must lie in (0, 1), got {}",
                c.min_discount
            )));
        }
        if !(c.diff > 0.0 && c.initial_step > 0.0 && c.tolerance > 0.0) {
            return Err(DlmError::InvalidParameter(
                "diff, initial_step and tolerance must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Fit a clone of `base` with `discounts` and return it with its MSE.
    fn evaluate(base: &Dlm, names: &[String], discounts: &[f64]) -> Result<(Dlm, f64)> {
        let mut dlm = base.clone();
        for (name, &d) in names.iter().zip(discounts) {
            dlm.set_discount(name, d)?;
        }
        dlm.fit_forward_filter()?;
        let mse = dlm.mse()?;
        Ok((dlm, mse))
    }

    fn gradient(&self, base: &Dlm, names: &[String], x: &[f64], fx: f64) -> Result<Vec<f64>> {
        let h = self.config.diff;
        (0..x.len())
            .map(|i| {
                let mut probe = x.to_vec();
                // Backward difference at the upper bound.
                let delta = if x[i] + h > 1.0 { -h } else { h };
                probe[i] += delta;
                let (_, fp) = Self::evaluate(base, names, &probe)?;
                Ok((fp - fx) / delta)
            })
            .collect()
    }

    /// Tune the discounts of `dlm`, one per component.
    pub fn tune(&self, dlm: &Dlm) -> Result<TuneResult> {
        self.validate()?;
        let (names, start): (Vec<String>, Vec<f64>) = dlm.component_discounts().into_iter().unzip();
        if names.is_empty() {
            return Err(DlmError::EmptyModel);
        }
        let lo = self.config.min_discount;

        let mut x: Vec<f64> = start.iter().map(|d| d.clamp(lo, 1.0)).collect();
        let (mut best_model, mut best) = Self::evaluate(dlm, &names, &x)?;
        if !best.is_finite() {
            return Err(DlmError::ComputationError(format!(
                "one-step MSE is {} at the starting discounts",
                best
            )));
        }
        let mut step = self.config.initial_step;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.max_iter {
            iterations += 1;
            let grad = self.gradient(dlm, &names, &x, best)?;
            let norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            if !norm.is_finite() {
                return Err(DlmError::ComputationError(format!(
                    "non-finite MSE gradient at iteration {}",
                    iterations
                )));
            }
            if norm < self.config.tolerance {
                converged = true;
                break;
            }

            let candidate: Vec<f64> = x
                .iter()
                .zip(&grad)
                .map(|(xi, gi)| (xi - step * gi / norm).clamp(lo, 1.0))
                .collect();
            let (model, value) = Self::evaluate(dlm, &names, &candidate)?;

            if value < best {
                debug!(iteration = iterations, mse = value, "discounts improved");
                x = candidate;
                best = value;
                best_model = model;
            } else {
                step /= 2.0;
                if step < self.config.tolerance {
                    converged = true;
                    break;
                }
            }
        }

        info!(iterations, mse = best, converged, "tuning finished");
        Ok(TuneResult {
            model: best_model,
            discounts: names.into_iter().zip(x).collect(),
            mse: best,
            iterations,
            converged,
        })
    }
}
