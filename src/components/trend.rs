//! Polynomial trend component.

use super::{assemble, Block, ComponentKind, StateComponent, DEFAULT_PRIOR_SCALE};
use crate::error::Result;
use nalgebra::{DMatrix, DVector};

/// Local polynomial trend of a given degree.
///
/// The latent block holds the level and its first `degree` increments. The
/// transition is the upper triangle of ones, so degree 0 is a local level
/// (random walk) and degree 1 is a local linear trend.
///
/// # Example
/// ```
/// use anofox_dlm::components::{StateComponent, Trend};
///
/// let trend = Trend::new(1, 0.98).unwrap().with_name("linear");
/// assert_eq!(trend.dimension(), 2);
/// assert_eq!(trend.transition()[(0, 1)], 1.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Trend {
    degree: usize,
    prior_scale: f64,
    block: Block,
}

impl Trend {
    /// Create a trend of polynomial `degree` with a shared `discount`.
    pub fn new(degree: usize, discount: f64) -> Result<Self> {
        let mut trend = Self {
            degree,
            prior_scale: DEFAULT_PRIOR_SCALE,
            block: Block::new("trend", degree + 1, discount)?,
        };
        assemble(&mut trend)?;
        Ok(trend)
    }

    /// Set the prior covariance scale `w` (prior covariance `w · I`).
    pub fn with_prior_scale(mut self, w: f64) -> Self {
        self.prior_scale = w;
        self.block.cov_prior = self.create_cov_prior();
        self
    }

    pub fn degree(&self) -> usize {
        self.degree
    }
}

impl StateComponent for Trend {
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
        let mut evaluation = DVector::zeros(self.degree + 1);
        evaluation[0] = 1.0;
        Ok(evaluation)
    }

    fn create_transition(&self) -> DMatrix<f64> {
        let d = self.degree + 1;
        DMatrix::from_fn(d, d, |i, j| if j >= i { 1.0 } else { 0.0 })
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        DVector::zeros(self.degree + 1)
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        let d = self.degree + 1;
        DMatrix::identity(d, d) * self.prior_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn local_level_is_scalar() {
        let t = Trend::new(0, 1.0).unwrap().with_prior_scale(1.0);
        assert_eq!(t.dimension(), 1);
        assert_relative_eq!(t.evaluation()[0], 1.0);
        assert_relative_eq!(t.transition()[(0, 0)], 1.0);
        assert_relative_eq!(t.cov_prior()[(0, 0)], 1.0);
        assert_relative_eq!(t.mean_prior()[0], 0.0);
    }

    #[test]
    fn quadratic_transition_is_upper_triangular_ones() {
        let t = Trend::new(2, 0.9).unwrap();
        let expected = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0]);
        assert_eq!(t.transition(), &expected);
        assert_eq!(t.evaluation().as_slice(), &[1.0, 0.0, 0.0]);
        assert_relative_eq!(t.cov_prior()[(2, 2)], DEFAULT_PRIOR_SCALE);
    }

    #[test]
    fn evaluation_is_constant_over_time() {
        let t = Trend::new(1, 0.9).unwrap();
        assert_eq!(t.create_evaluation(0).unwrap(), t.create_evaluation(500).unwrap());
    }

    #[test]
    fn invalid_discount_is_rejected() {
        assert!(Trend::new(0, 0.0).is_err());
        assert!(Trend::new(0, 2.0).is_err());
    }
}
