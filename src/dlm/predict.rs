//! Multi-step prediction with out-of-sample feature injection.

use super::Dlm;
use crate::components::{Component, StateComponent};
use crate::core::Forecast;
use crate::error::{DlmError, Result};
use nalgebra::DVector;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Caller-supplied evaluation rows per component name; row `k` is used for
/// the `k`-th step ahead.
pub type FeatureOverrides = HashMap<String, Vec<Vec<f64>>>;

impl Dlm {
    /// One-step-ahead prediction from the filtered state at `date`.
    pub fn predict(&mut self, date: usize, overrides: &FeatureOverrides) -> Result<Forecast> {
        self.predict_n(date, 1, overrides)
    }

    /// Predict `steps` ahead from the filtered state at `date`.
    ///
    /// The evaluation of each time-varying component at target `date + 1 + k`
    /// comes from, in order: the override row `k`, the component's own
    /// in-sample data, and for autoregressive components the observations up
    /// to `date` followed by the means already predicted.
    #[instrument(skip(self, overrides))]
    pub fn predict_n(
        &mut self,
        date: usize,
        steps: usize,
        overrides: &FeatureOverrides,
    ) -> Result<Forecast> {
        if self.filter.is_none() {
            return Err(DlmError::NotInitialized);
        }
        if !self
            .result
            .filtered_steps()
            .is_some_and(|w| w.contains(date))
        {
            return Err(DlmError::Unfiltered { date });
        }
        for name in overrides.keys() {
            match self.is_static(name) {
                None => return Err(DlmError::NotFound(name.clone())),
                Some(true) => {
                    return Err(DlmError::InvalidParameter(format!(
                        "component '{}' is static and takes no features",
                        name
                    )))
                }
                Some(false) => {}
            }
        }

        self.load_filtered(date)?;
        let df = self.builder.model()?.df;

        let mut means = Vec::with_capacity(steps);
        let mut variances = Vec::with_capacity(steps);
        for k in 0..steps {
            let target = date + 1 + k;
            if self.builder.has_time_varying() {
                let rows = self.forecast_evaluations(date, target, k, overrides, &means)?;
                for (name, row) in rows {
                    self.builder.set_component_evaluation(&name, row)?;
                }
            }

            let filter = self.filter.as_ref().ok_or(DlmError::NotInitialized)?;
            let model = self.builder.model_mut()?;
            filter.predict(model, 1);
            means.push(model.forecast.obs);
            variances.push(model.forecast.obs_var);
        }
        self.builder.model_mut()?.reset_forecast();

        debug!(date, steps, "prediction complete");
        Ok(Forecast::new(means, variances, df))
    }

    fn forecast_evaluations(
        &self,
        date: usize,
        target: usize,
        k: usize,
        overrides: &FeatureOverrides,
        predicted: &[f64],
    ) -> Result<Vec<(String, DVector<f64>)>> {
        self.builder
            .time_varying()
            .map(|component| {
                let name = component.name();
                let supplied = overrides.get(name).and_then(|rows| rows.get(k));
                let row = match (supplied, component) {
                    (Some(row), _) => DVector::from_column_slice(row),
                    (None, Component::AutoReg(ar)) => ar.window(target, date + 1, predicted)?,
                    (None, c) => c.create_evaluation(target)?,
                };
                Ok((name.to_string(), row))
            })
            .collect()
    }
}
