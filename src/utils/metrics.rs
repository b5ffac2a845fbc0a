//! Accuracy metrics for one-step-ahead predictions.

use crate::error::{DlmError, Result};

/// Accuracy metrics over the observed steps of a series.
#[derive(Debug, Clone, PartialEq)]
pub struct AccuracyMetrics {
    /// Mean Absolute Error
    pub mae: f64,
    /// Mean Squared Error
    pub mse: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Number of observed steps scored.
    pub n: usize,
}

/// Calculate accuracy metrics between observations and predictions.
///
/// Steps where the observation is missing are skipped.
///
/// # Arguments
/// * `actual` - Observed values, `None` where missing
/// * `predicted` - Predicted values aligned with `actual`
pub fn calculate_metrics(actual: &[Option<f64>], predicted: &[f64]) -> Result<AccuracyMetrics> {
    if actual.len() != predicted.len() {
        return Err(DlmError::DimensionMismatch(format!(
            "{} observations but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }

    let errors: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter_map(|(a, p)| a.map(|a| a - p))
        .collect();
    if errors.is_empty() {
        return Err(DlmError::InvalidParameter(
            "no observed values to score".into(),
        ));
    }

    let n = errors.len() as f64;
    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = errors.iter().map(|e| e * e).sum::<f64>() / n;

    Ok(AccuracyMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        n: errors.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_values() {
        let actual = vec![Some(1.0), Some(2.0), Some(3.0), Some(4.0)];
        let predicted = vec![1.5, 2.5, 2.5, 4.5];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();
        assert_relative_eq!(metrics.mae, 0.5, epsilon = 1e-10);
        assert_relative_eq!(metrics.mse, 0.25, epsilon = 1e-10);
        assert_relative_eq!(metrics.rmse, 0.5, epsilon = 1e-10);
        assert_eq!(metrics.n, 4);
    }

    #[test]
    fn missing_observations_are_skipped() {
        let actual = vec![Some(1.0), None, Some(3.0)];
        let predicted = vec![0.0, 100.0, 1.0];

        let metrics = calculate_metrics(&actual, &predicted).unwrap();
        assert_eq!(metrics.n, 2);
        assert_relative_eq!(metrics.mse, 2.5, epsilon = 1e-10);
    }

    #[test]
    fn length_mismatch_and_nothing_observed() {
        assert!(matches!(
            calculate_metrics(&[Some(1.0)], &[1.0, 2.0]),
            Err(DlmError::DimensionMismatch(_))
        ));
        assert!(matches!(
            calculate_metrics(&[None, None], &[1.0, 2.0]),
            Err(DlmError::InvalidParameter(_))
        ));
    }
}
