//! Free-form seasonal component.

use super::{assemble, Block, ComponentKind, StateComponent, DEFAULT_PRIOR_SCALE};
use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};

/// Seasonal effects over a cycle of `period` steps.
///
/// The latent block holds one effect per season and rotates by one position
/// each step. The prior is constrained so that the seasonal effects sum to
/// zero ("free form"), which keeps them separable from the trend level.
#[derive(Debug, Clone, PartialEq)]
pub struct Seasonality {
    period: usize,
    prior_scale: f64,
    block: Block,
}

impl Seasonality {
    /// Create a seasonal component with `period >= 2`.
    pub fn new(period: usize, discount: f64) -> Result<Self> {
        if period < 2 {
            return Err(DlmError::InvalidParameter(format!(
                "seasonal period must be at least 2, got {}",
                period
            )));
        }
        let mut seasonality = Self {
            period,
            prior_scale: DEFAULT_PRIOR_SCALE,
            block: Block::new("seasonality", period, discount)?,
        };
        assemble(&mut seasonality)?;
        Ok(seasonality)
    }

    /// Set the prior covariance scale `w` before the free-form constraint.
    pub fn with_prior_scale(mut self, w: f64) -> Self {
        self.prior_scale = w;
        self.block.cov_prior = self.create_cov_prior();
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

impl StateComponent for Seasonality {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Static
    }

    fn create_evaluation(&self, _step: usize) -> Result<DVector<f64>> {
        let mut evaluation = DVector::zeros(self.period);
        evaluation[0] = 1.0;
        Ok(evaluation)
    }

    fn create_transition(&self) -> DMatrix<f64> {
        let d = self.period;
        DMatrix::from_fn(d, d, |i, j| if j == (i + 1) % d { 1.0 } else { 0.0 })
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        DVector::zeros(self.period)
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        let d = self.period;
        centre_cov(DMatrix::identity(d, d) * self.prior_scale)
    }

    /// Custom means are centred so the effects still sum to zero.
    fn with_mean_prior(mut self, mean: DVector<f64>) -> Self {
        self.block.mean_prior = centre_mean(mean);
        self
    }

    /// Custom covariances get the same zero-sum shift as the default one.
    fn with_cov_prior(mut self, cov: DMatrix<f64>) -> Self {
        self.block.cov_prior = centre_cov(cov);
        self
    }
}

fn centre_mean(mean: DVector<f64>) -> DVector<f64> {
    if mean.is_empty() {
        return mean;
    }
    let centre = mean.mean();
    mean.add_scalar(-centre)
}

fn centre_cov(cov: DMatrix<f64>) -> DMatrix<f64> {
    if cov.is_empty() {
        return cov;
    }
    let shift = cov.sum() / cov.len() as f64;
    cov.add_scalar(-shift)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn transition_rotates_effects() {
        let s = Seasonality::new(4, 0.99).unwrap();
        let state = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0]);
        let next = s.transition() * &state;
        assert_eq!(next.as_slice(), &[2.0, 3.0, 4.0, 1.0]);

        // A full period returns to the starting arrangement.
        let mut cycled = state.clone();
        for _ in 0..4 {
            cycled = s.transition() * cycled;
        }
        assert_eq!(cycled, state);
    }

    #[test]
    fn free_form_prior_sums_to_zero() {
        let s = Seasonality::new(7, 0.99).unwrap().with_prior_scale(10.0);
        assert_relative_eq!(s.mean_prior().sum(), 0.0, epsilon = 1e-12);

        // Variance of the sum of effects vanishes under the constraint.
        let ones = DVector::from_element(7, 1.0);
        let var_sum = (s.cov_prior() * &ones).dot(&ones);
        assert_relative_eq!(var_sum, 0.0, epsilon = 1e-9);

        assert_relative_eq!(s.cov_prior()[(0, 0)], 10.0 - 10.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(s.cov_prior()[(0, 1)], -10.0 / 7.0, epsilon = 1e-12);
        assert!(s.check_dimensions().is_ok());
    }

    #[test]
    fn custom_priors_keep_zero_sum() {
        let s = Seasonality::new(3, 0.99)
            .unwrap()
            .with_mean_prior(DVector::from_vec(vec![1.0, 1.0, 4.0]))
            .with_cov_prior(DMatrix::from_diagonal_element(3, 3, 2.0));
        assert_relative_eq!(s.mean_prior().sum(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(s.mean_prior()[2], 2.0, epsilon = 1e-12);

        let ones = DVector::from_element(3, 1.0);
        assert_relative_eq!((s.cov_prior() * &ones).dot(&ones), 0.0, epsilon = 1e-12);
        assert!(s.check_dimensions().is_ok());

        // A wrongly sized prior is still reported.
        let bad = Seasonality::new(3, 0.99)
            .unwrap()
            .with_mean_prior(DVector::from_vec(vec![1.0, 2.0]));
        assert!(matches!(bad.check_dimensions(), Err(DlmError::DimensionMismatch(_))));
    }

    #[test]
    fn period_must_be_at_least_two() {
        assert!(matches!(
            Seasonality::new(1, 0.9),
            Err(DlmError::InvalidParameter(_))
        ));
    }
}
