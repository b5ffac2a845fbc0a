//! Read-only getters over the result store.

use super::Dlm;
use crate::components::{ComponentKind, StateComponent};
use crate::core::t_quantile;
use crate::error::{DlmError, Result};
use crate::filter::{Estimate, Watermark};
use crate::utils::AccuracyMetrics;
use nalgebra::{DMatrix, DVector};
use std::ops::Range;

/// Which stream of stored results to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// Filtered posterior at each step.
    ForwardFilter,
    /// Smoothed posterior at each step.
    BackwardSmoother,
    /// One-step-ahead prediction made for each step.
    Predict,
}

impl FilterType {
    /// Human-readable stream name used in errors.
    pub fn label(self) -> &'static str {
        match self {
            FilterType::ForwardFilter => "forward filter",
            FilterType::BackwardSmoother => "backward smoother",
            FilterType::Predict => "predict",
        }
    }
}

/// Borrowed view over a [`Dlm`]'s results.
///
/// Every getter returns the values over the valid range of the requested
/// stream, or [`DlmError::NoResults`] when that stream is empty.
#[derive(Debug, Clone, Copy)]
pub struct Access<'a> {
    dlm: &'a Dlm,
}

impl<'a> Access<'a> {
    pub(crate) fn new(dlm: &'a Dlm) -> Self {
        Self { dlm }
    }

    /// Valid index range of a stream.
    pub fn steps(&self, filter_type: FilterType) -> Result<Watermark> {
        let steps = match filter_type {
            FilterType::ForwardFilter | FilterType::Predict => self.dlm.result.filtered_steps(),
            FilterType::BackwardSmoother => self.dlm.result.smoothed_steps(),
        };
        steps.ok_or_else(|| DlmError::NoResults {
            stream: filter_type.label().to_string(),
        })
    }

    fn estimate(&self, filter_type: FilterType, t: usize) -> Result<&'a Estimate> {
        let result = &self.dlm.result;
        match filter_type {
            FilterType::ForwardFilter => result.filtered(t),
            FilterType::BackwardSmoother => result.smoothed(t),
            FilterType::Predict => result.predicted(t),
        }
        .ok_or(DlmError::Unfiltered { date: t })
    }

    fn per_step<T>(
        &self,
        filter_type: FilterType,
        f: impl Fn(usize, &'a Estimate) -> Result<T>,
    ) -> Result<Vec<T>> {
        let w = self.steps(filter_type)?;
        (w.lo..=w.hi)
            .map(|t| f(t, self.estimate(filter_type, t)?))
            .collect()
    }

    /// Degrees of freedom behind the estimate of a stream at `t`.
    fn df(&self, filter_type: FilterType, t: usize) -> f64 {
        let result = &self.dlm.result;
        match filter_type {
            FilterType::Predict => t.checked_sub(1).and_then(|p| result.df(p)).unwrap_or(1.0),
            _ => result.df(t).unwrap_or(1.0),
        }
    }

    /// Observation mean per step.
    pub fn mean(&self, filter_type: FilterType) -> Result<Vec<f64>> {
        self.per_step(filter_type, |_, e| Ok(e.obs))
    }

    /// Observation variance per step.
    pub fn variance(&self, filter_type: FilterType) -> Result<Vec<f64>> {
        self.per_step(filter_type, |_, e| Ok(e.obs_var))
    }

    /// Central Student-t intervals of coverage `level` per step.
    pub fn interval(&self, filter_type: FilterType, level: f64) -> Result<(Vec<f64>, Vec<f64>)> {
        let bounds = self.per_step(filter_type, |t, e| {
            let half = t_quantile(level, self.df(filter_type, t))? * e.obs_var.sqrt();
            Ok((e.obs - half, e.obs + half))
        })?;
        Ok(bounds.into_iter().unzip())
    }

    fn range(&self, component: Option<&str>) -> Result<Option<Range<usize>>> {
        component
            .map(|name| {
                self.dlm
                    .builder
                    .index(name)
                    .ok_or_else(|| DlmError::NotFound(name.to_string()))
            })
            .transpose()
    }

    /// Latent state per step, optionally restricted to one component.
    pub fn latent_state(
        &self,
        filter_type: FilterType,
        component: Option<&str>,
    ) -> Result<Vec<DVector<f64>>> {
        let range = self.range(component)?;
        self.per_step(filter_type, |_, e| {
            Ok(match &range {
                Some(r) => e.state.rows(r.start, r.len()).into_owned(),
                None => e.state.clone(),
            })
        })
    }

    /// Latent covariance per step, optionally restricted to one component.
    pub fn latent_cov(
        &self,
        filter_type: FilterType,
        component: Option<&str>,
    ) -> Result<Vec<DMatrix<f64>>> {
        let range = self.range(component)?;
        self.per_step(filter_type, |_, e| {
            Ok(match &range {
                Some(r) => e.cov.view((r.start, r.start), (r.len(), r.len())).into_owned(),
                None => e.cov.clone(),
            })
        })
    }

    fn component_evaluation(&self, name: &str, t: usize) -> Result<DVector<f64>> {
        let component = self
            .dlm
            .builder
            .get(name)
            .ok_or_else(|| DlmError::NotFound(name.to_string()))?;
        if component.kind() == ComponentKind::Static {
            Ok(component.evaluation().clone())
        } else {
            component.create_evaluation(t)
        }
    }

    /// Contribution `E_c(t)·θ_c(t)` of one component to the observation mean.
    pub fn component_mean(&self, filter_type: FilterType, name: &str) -> Result<Vec<f64>> {
        let r = self.range(Some(name))?.ok_or_else(|| DlmError::NotFound(name.to_string()))?;
        self.per_step(filter_type, |t, e| {
            let evaluation = self.component_evaluation(name, t)?;
            Ok(evaluation.dot(&e.state.rows(r.start, r.len())))
        })
    }

    /// Variance `E_c(t)·C_c(t)·E_c(t)ᵗ` of one component's contribution.
    pub fn component_variance(&self, filter_type: FilterType, name: &str) -> Result<Vec<f64>> {
        let r = self.range(Some(name))?.ok_or_else(|| DlmError::NotFound(name.to_string()))?;
        self.per_step(filter_type, |t, e| {
            let evaluation = self.component_evaluation(name, t)?;
            let cov = e.cov.view((r.start, r.start), (r.len(), r.len()));
            Ok((cov * &evaluation).dot(&evaluation))
        })
    }

    /// Accuracy of one-step-ahead predictions over the filtered range.
    pub fn accuracy(&self) -> Result<AccuracyMetrics> {
        self.dlm.accuracy()
    }
}
