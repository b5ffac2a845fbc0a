//! Forecast result structure for holding multi-step predictions.

use crate::error::{DlmError, Result};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Two-sided Student-t quantile for a central interval of coverage `level`.
pub(crate) fn t_quantile(level: f64, df: f64) -> Result<f64> {
    if !(level > 0.0 && level < 1.0) {
        return Err(DlmError::InvalidParameter(format!(
            "interval level must lie in (0, 1), got {}",
            level
        )));
    }
    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| DlmError::ComputationError(format!("student-t with df={}: {}", df, e)))?;
    Ok(dist.inverse_cdf(0.5 + level / 2.0))
}

/// Multi-step forecast: predictive means, variances and the degrees of
/// freedom of the noise estimate they were made with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Forecast {
    mean: Vec<f64>,
    variance: Vec<f64>,
    df: f64,
    lower: Option<Vec<f64>>,
    upper: Option<Vec<f64>>,
}

impl Forecast {
    pub fn new(mean: Vec<f64>, variance: Vec<f64>, df: f64) -> Self {
        Self {
            mean,
            variance,
            df,
            lower: None,
            upper: None,
        }
    }

    /// Number of steps ahead.
    pub fn horizon(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.variance
    }

    pub fn df(&self) -> f64 {
        self.df
    }

    /// Attach central Student-t intervals of coverage `level`.
    pub fn with_intervals(mut self, level: f64) -> Result<Self> {
        let (lower, upper) = self.intervals(level)?;
        self.lower = Some(lower);
        self.upper = Some(upper);
        Ok(self)
    }

    /// Compute central Student-t intervals of coverage `level` without storing them.
    pub fn intervals(&self, level: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        let q = t_quantile(level, self.df)?;
        Ok(self
            .mean
            .iter()
            .zip(&self.variance)
            .map(|(m, v)| {
                let half = q * v.sqrt();
                (m - half, m + half)
            })
            .unzip())
    }

    pub fn lower(&self) -> Option<&[f64]> {
        self.lower.as_deref()
    }

    pub fn upper(&self) -> Option<&[f64]> {
        self.upper.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn intervals_are_symmetric_and_widen_with_variance() {
        let forecast = Forecast::new(vec![1.0, 1.0], vec![1.0, 4.0], 10.0)
            .with_intervals(0.95)
            .unwrap();
        let lower = forecast.lower().unwrap();
        let upper = forecast.upper().unwrap();

        assert_relative_eq!(upper[0] - 1.0, 1.0 - lower[0], epsilon = 1e-12);
        assert_relative_eq!(upper[1] - lower[1], 2.0 * (upper[0] - lower[0]), epsilon = 1e-9);
        // t(10) 97.5% quantile.
        assert_relative_eq!(upper[0] - 1.0, 2.228139, epsilon = 1e-5);
    }

    #[test]
    fn heavier_tails_with_fewer_df() {
        let wide = t_quantile(0.9, 2.0).unwrap();
        let narrow = t_quantile(0.9, 200.0).unwrap();
        assert!(wide > narrow);
        assert_relative_eq!(narrow, 1.6525, epsilon = 1e-3);
    }

    #[test]
    fn level_must_be_a_probability() {
        let forecast = Forecast::new(vec![0.0], vec![1.0], 3.0);
        assert!(forecast.intervals(1.0).is_err());
        assert!(forecast.intervals(0.0).is_err());
        assert!(forecast.lower().is_none());
        assert_eq!(forecast.horizon(), 1);
    }
}
