//! Dynamic regression on exogenous features.

use super::{assemble, Block, ComponentKind, StateComponent, TimeVarying, DEFAULT_PRIOR_SCALE};
use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};

/// Regression on a feature matrix supplied by the caller.
///
/// Row `t` of the feature matrix is the evaluation vector at time `t`; the
/// latent block holds the (slowly drifting) regression coefficients.
///
/// # Example
/// ```
/// use anofox_dlm::components::{Dynamic, StateComponent};
///
/// let features = vec![vec![1.0, 0.5], vec![2.0, 0.1], vec![3.0, 0.7]];
/// let reg = Dynamic::new(features, 0.99).unwrap().with_name("promo");
/// assert_eq!(reg.dimension(), 2);
/// assert_eq!(reg.create_evaluation(1).unwrap().as_slice(), &[2.0, 0.1]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Dynamic {
    features: Vec<Vec<f64>>,
    prior_scale: f64,
    block: Block,
}

impl Dynamic {
    /// Create a regression component; the feature width sets the dimension.
    pub fn new(features: Vec<Vec<f64>>, discount: f64) -> Result<Self> {
        let d = features.first().map(|row| row.len()).ok_or_else(|| {
            DlmError::InvalidParameter("dynamic component requires at least one feature row".into())
        })?;
        if let Some(bad) = features.iter().find(|row| row.len() != d) {
            return Err(DlmError::DimensionMismatch(format!(
                "feature rows must all have length {}, found a row of length {}",
                d,
                bad.len()
            )));
        }

        let mut dynamic = Self {
            features,
            prior_scale: DEFAULT_PRIOR_SCALE,
            block: Block::new("dynamic", d, discount)?,
        };
        assemble(&mut dynamic)?;
        Ok(dynamic)
    }

    pub fn with_prior_scale(mut self, w: f64) -> Self {
        self.prior_scale = w;
        self.block.cov_prior = self.create_cov_prior();
        self
    }

    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    fn check_row(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.dimension() {
            return Err(DlmError::DimensionMismatch(format!(
                "component '{}' expects feature rows of length {}, got {}",
                self.name(),
                self.dimension(),
                row.len()
            )));
        }
        Ok(())
    }
}

impl StateComponent for Dynamic {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Dynamic
    }

    fn create_evaluation(&self, step: usize) -> Result<DVector<f64>> {
        self.features
            .get(step)
            .map(|row| DVector::from_column_slice(row))
            .ok_or_else(|| DlmError::MissingFeature {
                component: self.name().to_string(),
                step,
            })
    }

    fn create_transition(&self) -> DMatrix<f64> {
        let d = self.dimension();
        DMatrix::identity(d, d)
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        DVector::zeros(self.dimension())
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        let d = self.dimension();
        DMatrix::identity(d, d) * self.prior_scale
    }
}

impl TimeVarying for Dynamic {
    type Datum = Vec<f64>;

    fn len(&self) -> usize {
        self.features.len()
    }

    fn append_new_data(&mut self, data: Vec<Vec<f64>>) -> Result<()> {
        for row in &data {
            self.check_row(row)?;
        }
        self.features.extend(data);
        Ok(())
    }

    fn popout(&mut self, date: usize) -> Result<()> {
        if date >= self.features.len() {
            return Err(DlmError::IndexOutOfBounds {
                index: date,
                size: self.features.len(),
            });
        }
        self.features.remove(date);
        Ok(())
    }

    fn alter(&mut self, date: usize, datum: Vec<f64>) -> Result<()> {
        self.check_row(&datum)?;
        let size = self.features.len();
        let row = self
            .features
            .get_mut(date)
            .ok_or(DlmError::IndexOutOfBounds { index: date, size })?;
        *row = datum;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> Vec<Vec<f64>> {
        vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]
    }

    #[test]
    fn evaluation_follows_feature_rows() {
        let mut reg = Dynamic::new(rows(), 0.95).unwrap();
        assert_eq!(reg.evaluation().as_slice(), &[1.0, 10.0]);

        reg.update_evaluation(2).unwrap();
        assert_eq!(reg.evaluation().as_slice(), &[3.0, 30.0]);
        assert_eq!(reg.kind(), ComponentKind::Dynamic);
    }

    #[test]
    fn evaluation_beyond_features_is_missing() {
        let reg = Dynamic::new(rows(), 0.95).unwrap().with_name("x");
        assert_eq!(
            reg.create_evaluation(3),
            Err(DlmError::MissingFeature {
                component: "x".to_string(),
                step: 3
            })
        );
    }

    #[test]
    fn ragged_or_empty_features_are_rejected() {
        assert!(matches!(
            Dynamic::new(vec![], 0.9),
            Err(DlmError::InvalidParameter(_))
        ));
        assert!(matches!(
            Dynamic::new(vec![vec![1.0, 2.0], vec![1.0]], 0.9),
            Err(DlmError::DimensionMismatch(_))
        ));
    }

    #[test]
    fn append_pop_alter_edit_feature_rows() {
        let mut reg = Dynamic::new(rows(), 0.95).unwrap();

        reg.append_new_data(vec![vec![4.0, 40.0]]).unwrap();
        assert_eq!(reg.len(), 4);
        assert!(reg.append_new_data(vec![vec![5.0]]).is_err());

        reg.popout(1).unwrap();
        assert_eq!(reg.features()[1], vec![3.0, 30.0]);
        assert_eq!(reg.len(), 3);

        reg.alter(0, vec![-1.0, -10.0]).unwrap();
        assert_eq!(reg.create_evaluation(0).unwrap().as_slice(), &[-1.0, -10.0]);

        assert!(matches!(
            reg.popout(10),
            Err(DlmError::IndexOutOfBounds { index: 10, size: 3 })
        ));
        assert!(reg.alter(7, vec![0.0, 0.0]).is_err());
    }
}
