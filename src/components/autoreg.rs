//! Autoregressive component over lagged observations.

use super::{assemble, Block, ComponentKind, StateComponent, TimeVarying, DEFAULT_PRIOR_SCALE};
use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};

/// Regression on the last `degree` observations of the series itself.
///
/// The evaluation at step `i` is the window `X[i-degree .. i]` of the raw
/// series. Steps before `degree` are left-padded with `padding`, and missing
/// observations inside a window are replaced by `padding` as well.
///
/// The component keeps its own copy of the observed series; the model keeps
/// it in sync on append, pop and alter.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoReg {
    degree: usize,
    padding: f64,
    data: Vec<Option<f64>>,
    prior_scale: f64,
    block: Block,
}

impl AutoReg {
    /// Create an AR component with `degree >= 1` lags. The default name is `ar{degree}`.
    pub fn new(degree: usize, discount: f64) -> Result<Self> {
        if degree == 0 {
            return Err(DlmError::InvalidParameter(
                "autoregressive degree must be at least 1".into(),
            ));
        }
        let mut ar = Self {
            degree,
            padding: 0.0,
            data: Vec::new(),
            prior_scale: DEFAULT_PRIOR_SCALE,
            block: Block::new(&format!("ar{}", degree), degree, discount)?,
        };
        assemble(&mut ar)?;
        Ok(ar)
    }

    /// Value used for lags before the start of the series and for missing data.
    pub fn with_padding(mut self, padding: f64) -> Self {
        self.padding = padding;
        self.block.evaluation = DVector::from_element(self.degree, padding);
        self
    }

    pub fn with_prior_scale(mut self, w: f64) -> Self {
        self.prior_scale = w;
        self.block.cov_prior = self.create_cov_prior();
        self
    }

    /// Build the component over an observed series.
    pub fn with_data(mut self, data: Vec<Option<f64>>) -> Self {
        self.data = data;
        self
    }

    pub(crate) fn set_data(&mut self, data: Vec<Option<f64>>) {
        self.data = data;
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn padding(&self) -> f64 {
        self.padding
    }

    pub fn data(&self) -> &[Option<f64>] {
        &self.data
    }

    /// Lag window for `step` using only the first `history` observations;
    /// later lags are read from `extension` (for example forecast means).
    pub fn window(&self, step: usize, history: usize, extension: &[f64]) -> Result<DVector<f64>> {
        let n = history.min(self.data.len());
        if step > n + extension.len() {
            return Err(DlmError::MissingFeature {
                component: self.name().to_string(),
                step,
            });
        }

        let lags = (0..self.degree).map(|j| {
            // Position in the series left-padded with `degree` entries.
            let padded = step + j;
            if padded < self.degree {
                return self.padding;
            }
            let i = padded - self.degree;
            if i < n {
                self.data[i].unwrap_or(self.padding)
            } else {
                extension[i - n]
            }
        });
        Ok(DVector::from_iterator(self.degree, lags))
    }
}

impl StateComponent for AutoReg {
    fn block(&self) -> &Block {
        &self.block
    }

    fn block_mut(&mut self) -> &mut Block {
        &mut self.block
    }

    fn kind(&self) -> ComponentKind {
        ComponentKind::Automatic
    }

    fn create_evaluation(&self, step: usize) -> Result<DVector<f64>> {
        self.window(step, self.data.len(), &[])
    }

    fn create_transition(&self) -> DMatrix<f64> {
        DMatrix::identity(self.degree, self.degree)
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        DVector::zeros(self.degree)
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        DMatrix::identity(self.degree, self.degree) * self.prior_scale
    }
}

impl TimeVarying for AutoReg {
    type Datum = Option<f64>;

    fn len(&self) -> usize {
        self.data.len()
    }

    fn append_new_data(&mut self, data: Vec<Option<f64>>) -> Result<()> {
        self.data.extend(data);
        Ok(())
    }

    /// Removing an observation shifts every later window: each subsequent row
    /// drops its oldest lag and takes the row's new immediate predecessor.
    fn popout(&mut self, date: usize) -> Result<()> {
        let n = self.data.len();
        if date >= n {
            return Err(DlmError::IndexOutOfBounds { index: date, size: n });
        }
        if self.degree > n - 1 {
            return Err(DlmError::DegreeExceedsData {
                degree: self.degree,
                len: n - 1,
            });
        }
        self.data.remove(date);
        Ok(())
    }

    fn alter(&mut self, date: usize, datum: Option<f64>) -> Result<()> {
        let size = self.data.len();
        let slot = self
            .data
            .get_mut(date)
            .ok_or(DlmError::IndexOutOfBounds { index: date, size })?;
        *slot = datum;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> Vec<Option<f64>> {
        (0..n).map(|i| Some(i as f64 + 1.0)).collect()
    }

    #[test]
    fn windows_are_padded_then_lagged() {
        let ar = AutoReg::new(3, 0.9).unwrap().with_padding(-1.0).with_data(series(6));

        assert_eq!(ar.create_evaluation(0).unwrap().as_slice(), &[-1.0, -1.0, -1.0]);
        assert_eq!(ar.create_evaluation(1).unwrap().as_slice(), &[-1.0, -1.0, 1.0]);
        assert_eq!(ar.create_evaluation(2).unwrap().as_slice(), &[-1.0, 1.0, 2.0]);
        assert_eq!(ar.create_evaluation(3).unwrap().as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(ar.create_evaluation(6).unwrap().as_slice(), &[4.0, 5.0, 6.0]);
        assert!(ar.create_evaluation(7).is_err());
    }

    #[test]
    fn missing_observations_use_padding() {
        let ar = AutoReg::new(2, 0.9)
            .unwrap()
            .with_padding(0.5)
            .with_data(vec![Some(1.0), None, Some(3.0)]);
        assert_eq!(ar.create_evaluation(2).unwrap().as_slice(), &[1.0, 0.5]);
        assert_eq!(ar.create_evaluation(3).unwrap().as_slice(), &[0.5, 3.0]);
    }

    #[test]
    fn window_reads_extension_past_data() {
        let ar = AutoReg::new(2, 0.9).unwrap().with_data(series(3));
        assert_eq!(ar.window(4, 3, &[10.0]).unwrap().as_slice(), &[3.0, 10.0]);
        assert_eq!(ar.window(5, 3, &[10.0, 11.0]).unwrap().as_slice(), &[10.0, 11.0]);
        assert!(ar.window(5, 3, &[10.0]).is_err());
        // Truncated history ignores later observations.
        assert_eq!(ar.window(3, 2, &[7.0]).unwrap().as_slice(), &[2.0, 7.0]);
    }

    #[test]
    fn popout_rederives_neighbouring_windows() {
        let mut ar = AutoReg::new(2, 0.9).unwrap().with_data(series(5));
        // Before: row 4 = [3, 4]
        ar.popout(2).unwrap();
        // Series is now [1, 2, 4, 5]; row 3 takes 2 as its oldest lag.
        assert_eq!(ar.create_evaluation(3).unwrap().as_slice(), &[2.0, 4.0]);
        assert_eq!(ar.create_evaluation(4).unwrap().as_slice(), &[4.0, 5.0]);
    }

    #[test]
    fn popout_rejects_degree_longer_than_remaining() {
        let mut ar = AutoReg::new(3, 0.9).unwrap().with_data(series(3));
        assert_eq!(
            ar.popout(0),
            Err(DlmError::DegreeExceedsData { degree: 3, len: 2 })
        );
        assert_eq!(ar.len(), 3);
    }

    #[test]
    fn alter_changes_later_windows() {
        let mut ar = AutoReg::new(1, 0.9).unwrap().with_data(series(3));
        ar.alter(1, Some(9.0)).unwrap();
        assert_eq!(ar.create_evaluation(2).unwrap().as_slice(), &[9.0]);
        assert!(ar.alter(3, None).is_err());
    }

    #[test]
    fn default_name_tracks_degree() {
        let ar = AutoReg::new(2, 0.9).unwrap();
        assert_eq!(ar.name(), "ar2");
        assert_eq!(ar.kind(), ComponentKind::Automatic);
    }
}
