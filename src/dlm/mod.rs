//! The filter orchestrator: drives the Kalman engine across the series and
//! keeps the result store consistent with the data.

mod access;
mod mutation;
mod predict;

pub use access::{Access, FilterType};
pub use predict::FeatureOverrides;

use crate::components::{Component, ComponentKind, StateComponent};
use crate::core::DlmConfig;
use crate::error::{DlmError, Result};
use crate::filter::{Estimate, KalmanFilter, ResultStore, StepRecord};
use crate::linalg::sample_mvn;
use crate::model::ModelBuilder;
use crate::utils::{calculate_metrics, AccuracyMetrics};
use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use tracing::{debug, instrument, trace};

/// One joint draw of the latent trajectory and observations.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplePath {
    /// First index covered by the draw.
    pub start: usize,
    pub states: Vec<DVector<f64>>,
    pub observations: Vec<f64>,
}

/// Bayesian dynamic linear model over a univariate series.
///
/// # Example
/// ```
/// use anofox_dlm::prelude::*;
///
/// let mut dlm = Dlm::from_values(&[1.0, 2.0, 2.5, 3.1, 4.0, 4.8]);
/// dlm.add(Trend::new(1, 0.98).unwrap()).unwrap();
/// dlm.fit().unwrap();
///
/// let smoothed = dlm.access().mean(FilterType::BackwardSmoother).unwrap();
/// assert_eq!(smoothed.len(), 6);
///
/// let forecast = dlm.predict_n(5, 3, &FeatureOverrides::new()).unwrap();
/// assert_eq!(forecast.horizon(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct Dlm {
    data: Vec<Option<f64>>,
    builder: ModelBuilder,
    filter: Option<KalmanFilter>,
    result: ResultStore,
    config: DlmConfig,
}

impl Dlm {
    /// Create a model over `data`; `None` or NaN marks a missing observation.
    pub fn new(data: Vec<Option<f64>>) -> Self {
        let config = DlmConfig::default();
        let data: Vec<Option<f64>> = data.into_iter().map(|v| config.clean(v)).collect();
        let n = data.len();
        Self {
            data,
            builder: ModelBuilder::new(),
            filter: None,
            result: ResultStore::new(n),
            config,
        }
    }

    /// Create a model over raw values, treating NaN as missing.
    pub fn from_values(values: &[f64]) -> Self {
        Self::from_values_with_config(values, DlmConfig::default())
    }

    /// Create a model over raw values, mapping missing markers through `config`.
    pub fn from_values_with_config(values: &[f64], config: DlmConfig) -> Self {
        let data = values.iter().map(|&v| config.observation(v)).collect();
        Self::new(data).with_config(config)
    }

    /// Replace the configuration. Stored observations are re-read under the
    /// new missing-value markers.
    pub fn with_config(mut self, config: DlmConfig) -> Self {
        self.data = self.data.iter().map(|&v| config.clean(v)).collect();
        for component in self.builder.time_varying_mut() {
            if let Some(ar) = component.as_autoreg_mut() {
                ar.set_data(self.data.clone());
            }
        }
        self.config = config;
        self.mark_uninitialized();
        self
    }

    pub fn config(&self) -> &DlmConfig {
        &self.config
    }

    pub fn data(&self) -> &[Option<f64>] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn builder(&self) -> &ModelBuilder {
        &self.builder
    }

    pub fn result(&self) -> &ResultStore {
        &self.result
    }

    /// Read-only view over the stored results.
    pub fn access(&self) -> Access<'_> {
        Access::new(self)
    }

    pub fn is_initialized(&self) -> bool {
        self.filter.is_some()
    }

    fn mark_uninitialized(&mut self) {
        self.filter = None;
        self.result.invalidate_all();
    }

    /// Register a component.
    ///
    /// Autoregressive components are bound to this model's series, and
    /// dynamic components must supply one feature row per observation.
    pub fn add(&mut self, component: impl Into<Component>) -> Result<()> {
        let mut component = component.into();
        if let Component::AutoReg(ar) = &mut component {
            ar.set_data(self.data.clone());
        }
        if let Component::Dynamic(dynamic) = &component {
            if dynamic.features().len() != self.data.len() {
                return Err(DlmError::DimensionMismatch(format!(
                    "component '{}' has {} feature rows for a series of length {}",
                    dynamic.name(),
                    dynamic.features().len(),
                    self.data.len()
                )));
            }
        }
        self.builder.add(component)?;
        self.mark_uninitialized();
        Ok(())
    }

    /// Remove a component and return it.
    pub fn delete(&mut self, name: &str) -> Result<Component> {
        let removed = self.builder.delete(name)?;
        self.mark_uninitialized();
        Ok(removed)
    }

    /// Assemble the state-space model and the Kalman engine. Discards all results.
    pub fn initialize(&mut self) -> Result<()> {
        self.builder.initialize(self.config.prior_noise_var)?;
        let filter = KalmanFilter::new(self.builder.discount())?
            .with_innovation(self.config.innovation, &self.builder.blocks());
        filter.check_dimension(self.builder.dimension())?;

        self.filter = Some(filter);
        self.result.invalidate_all();
        debug!(
            n = self.data.len(),
            dimension = self.builder.dimension(),
            "dlm initialized"
        );
        Ok(())
    }

    fn ensure_initialized(&mut self) -> Result<()> {
        if !self.is_initialized() {
            self.initialize()?;
        }
        Ok(())
    }

    fn check_date(&self, date: usize) -> Result<()> {
        if date >= self.data.len() {
            return Err(DlmError::IndexOutOfBounds {
                index: date,
                size: self.data.len(),
            });
        }
        Ok(())
    }

    /// Load the stored filtered estimate at `date` into the model.
    fn load_filtered(&mut self, date: usize) -> Result<()> {
        let estimate = self
            .result
            .filtered(date)
            .cloned()
            .ok_or(DlmError::Unfiltered { date })?;
        let noise_var = self.result.noise_var(date).ok_or(DlmError::Unfiltered { date })?;
        let df = self.result.df(date).ok_or(DlmError::Unfiltered { date })?;
        self.builder
            .model_mut()?
            .load(estimate.state, estimate.cov, noise_var, df);
        Ok(())
    }

    /// Refresh the global evaluation for `step` when any component varies in time.
    fn refresh_evaluation(&mut self, step: usize) -> Result<()> {
        if self.builder.has_time_varying() {
            self.builder.update_evaluation(step)?;
        }
        Ok(())
    }

    /// Run the forward filter over `[start, end]`.
    ///
    /// Filtering restarts from the prior when `start == 0` or
    /// `forget_previous` is set; otherwise it resumes from the stored result
    /// at `start - 1`. Results are committed only if every step succeeds.
    #[instrument(skip(self), fields(n = self.data.len()))]
    pub fn forward_filter(&mut self, start: usize, end: usize, forget_previous: bool) -> Result<()> {
        if self.filter.is_none() {
            return Err(DlmError::NotInitialized);
        }
        self.check_date(end)?;
        if start > end {
            return Err(DlmError::InvalidParameter(format!(
                "filter range start {} is after end {}",
                start, end
            )));
        }
        if self.builder.has_time_varying() {
            self.builder.ensure_evaluations(end)?;
        }

        let lo = if start == 0 || forget_previous {
            self.builder.reset_to_prior()?;
            start
        } else {
            let watermark = self
                .result
                .filtered_steps()
                .filter(|w| w.contains(start - 1))
                .ok_or(DlmError::UnfilteredPredecessor { start })?;
            self.load_filtered(start - 1)?;
            watermark.lo
        };

        let mut records = Vec::with_capacity(end - start + 1);
        for t in start..=end {
            self.refresh_evaluation(t)?;
            let filter = self.filter.as_ref().ok_or(DlmError::NotInitialized)?;
            let model = self.builder.model_mut()?;
            filter.forward_filter(model, self.data[t]);
            trace!(t, obs = model.obs, noise_var = model.noise_var, "filtered");

            records.push(StepRecord {
                filtered: Estimate::posterior(model),
                predicted: Estimate::prediction(model),
                noise_var: model.noise_var,
                df: model.df,
            });
        }

        self.result.commit_filtered(start, lo, records);
        Ok(())
    }

    /// Resolve the backward traversal `[stop, start]` for smoothing or sampling.
    fn backward_range(&self, start: usize, days: Option<usize>) -> Result<usize> {
        let watermark = self
            .result
            .filtered_steps()
            .filter(|w| w.contains(start))
            .ok_or(DlmError::Unfiltered { date: start })?;
        Ok(match days {
            Some(days) => start.saturating_sub(days).max(watermark.lo),
            None => watermark.lo,
        })
    }

    /// Put the stored inputs for the backward step into `day` in place: the
    /// one-step prediction for `day + 1`, the noise variance and evaluation
    /// at `day`. Returns the filtered estimate at `day`.
    fn prepare_backward_step(&mut self, day: usize) -> Result<Estimate> {
        let predicted = self
            .result
            .predicted(day + 1)
            .cloned()
            .ok_or(DlmError::Unfiltered { date: day + 1 })?;
        let raw = self
            .result
            .filtered(day)
            .cloned()
            .ok_or(DlmError::Unfiltered { date: day })?;
        let noise_var = self.result.noise_var(day).ok_or(DlmError::Unfiltered { date: day })?;

        self.refresh_evaluation(day)?;
        let model = self.builder.model_mut()?;
        model.forecast.state = predicted.state;
        model.forecast.sys_var = predicted.cov;
        model.noise_var = noise_var;
        Ok(raw)
    }

    /// Run the backward smoother from `start` over at most `days` earlier steps.
    ///
    /// Without `days` the pass runs down to the start of the filtered range.
    #[instrument(skip(self))]
    pub fn backward_smoother(&mut self, start: usize, days: Option<usize>) -> Result<()> {
        if self.filter.is_none() {
            return Err(DlmError::NotInitialized);
        }
        let stop = self.backward_range(start, days)?;

        self.load_filtered(start)?;
        let seed = self
            .result
            .filtered(start)
            .cloned()
            .ok_or(DlmError::Unfiltered { date: start })?;
        let mut estimates = vec![seed];

        for day in (stop..start).rev() {
            let raw = self.prepare_backward_step(day)?;
            let filter = self.filter.as_ref().ok_or(DlmError::NotInitialized)?;
            let model = self.builder.model_mut()?;
            filter.backward_smoother(model, &raw.state, &raw.cov)?;
            trace!(day, obs = model.obs, "smoothed");
            estimates.push(Estimate::posterior(model));
        }

        estimates.reverse();
        self.result.commit_smoothed(stop, estimates);
        Ok(())
    }

    /// Draw one latent trajectory over `[start - days, start]` by forward
    /// filtering, backward sampling. The result store is left untouched.
    #[instrument(skip(self, rng))]
    pub fn backward_sample<R: Rng + ?Sized>(
        &mut self,
        start: usize,
        days: Option<usize>,
        rng: &mut R,
    ) -> Result<SamplePath> {
        if self.filter.is_none() {
            return Err(DlmError::NotInitialized);
        }
        let stop = self.backward_range(start, days)?;

        let seed = self
            .result
            .filtered(start)
            .cloned()
            .ok_or(DlmError::Unfiltered { date: start })?;
        let noise_var = self.result.noise_var(start).ok_or(DlmError::Unfiltered { date: start })?;
        let df = self.result.df(start).ok_or(DlmError::Unfiltered { date: start })?;
        let draw = sample_mvn(&seed.state, &seed.cov, rng)?;
        let noise: f64 = StandardNormal.sample(rng);

        self.refresh_evaluation(start)?;
        let n = draw.len();
        let model = self.builder.model_mut()?;
        model.load(draw, DMatrix::zeros(n, n), noise_var, df);

        let mut states = vec![model.state.clone()];
        let mut observations = vec![model.obs + noise_var.sqrt() * noise];

        for day in (stop..start).rev() {
            let raw = self.prepare_backward_step(day)?;
            let filter = self.filter.as_ref().ok_or(DlmError::NotInitialized)?;
            let model = self.builder.model_mut()?;
            filter.backward_sampler(model, &raw.state, &raw.cov, rng)?;
            states.push(model.state.clone());
            observations.push(model.obs);
        }

        states.reverse();
        observations.reverse();
        Ok(SamplePath {
            start: stop,
            states,
            observations,
        })
    }

    /// Forward filter the whole series, resuming from the filtered range when possible.
    pub fn fit_forward_filter(&mut self) -> Result<()> {
        self.ensure_initialized()?;
        let n = self.data.len();
        if n == 0 {
            return Ok(());
        }
        let start = match self.result.filtered_steps() {
            Some(w) if w.hi + 1 >= n => return Ok(()),
            Some(w) => w.hi + 1,
            None => 0,
        };
        self.forward_filter(start, n - 1, false)
    }

    /// Smooth backward from the end of the filtered range.
    pub fn fit_backward_smoother(&mut self) -> Result<()> {
        let watermark = self.result.filtered_steps().ok_or_else(|| DlmError::NoResults {
            stream: FilterType::ForwardFilter.label().to_string(),
        })?;
        self.backward_smoother(watermark.hi, None)
    }

    /// Forward filter then smooth the whole series.
    pub fn fit(&mut self) -> Result<()> {
        self.fit_forward_filter()?;
        self.fit_backward_smoother()
    }

    /// Accuracy of the one-step-ahead predictions over the filtered range.
    pub fn accuracy(&self) -> Result<AccuracyMetrics> {
        let watermark = self
            .result
            .filtered_steps()
            .ok_or_else(|| DlmError::NoResults {
                stream: FilterType::ForwardFilter.label().to_string(),
            })?;
        let predicted = (watermark.lo..=watermark.hi)
            .map(|t| {
                self.result
                    .predicted(t)
                    .map(|e| e.obs)
                    .ok_or(DlmError::Unfiltered { date: t })
            })
            .collect::<Result<Vec<_>>>()?;
        calculate_metrics(&self.data[watermark.lo..=watermark.hi], &predicted)
    }

    /// One-step-ahead mean squared error over the filtered range.
    pub fn mse(&self) -> Result<f64> {
        Ok(self.accuracy()?.mse)
    }

    /// Change one component's discount. Invalidates all results.
    pub fn set_discount(&mut self, name: &str, discount: f64) -> Result<()> {
        self.builder.set_discount(name, discount)?;
        if let Some(filter) = self.filter.as_mut() {
            filter.update_discount(self.builder.discount())?;
        }
        self.result.invalidate_all();
        Ok(())
    }

    /// Replace the discount vector, one value per latent dimension. Invalidates all results.
    pub fn update_discount(&mut self, discount: &[f64]) -> Result<()> {
        self.ensure_initialized()?;
        self.builder.set_discounts(discount)?;
        if let Some(filter) = self.filter.as_mut() {
            filter.update_discount(discount)?;
        }
        self.result.invalidate_all();
        Ok(())
    }

    /// First discount of every component, in layout order.
    pub fn component_discounts(&self) -> Vec<(String, f64)> {
        self.builder
            .components()
            .map(|c| (c.name().to_string(), c.discount().first().copied().unwrap_or(1.0)))
            .collect()
    }

    /// Whether a component contributes a constant evaluation.
    pub(crate) fn is_static(&self, name: &str) -> Option<bool> {
        self.builder
            .get(name)
            .map(|c| c.kind() == ComponentKind::Static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AutoReg, Dynamic, Trend};
    use crate::filter::Watermark;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn local_level(data: Vec<Option<f64>>, discount: f64) -> Dlm {
        let mut dlm = Dlm::new(data);
        dlm.add(Trend::new(0, discount).unwrap().with_prior_scale(1.0))
            .unwrap();
        dlm.initialize().unwrap();
        dlm
    }

    #[test]
    fn first_step_matches_closed_form() {
        let mut dlm = local_level(vec![Some(1.0)], 1.0);
        dlm.forward_filter(0, 0, false).unwrap();
        let filtered = dlm.result().filtered(0).unwrap();
        assert_relative_eq!(filtered.state[0], 0.5, epsilon = 1e-12);
        assert_relative_eq!(filtered.cov[(0, 0)], 0.375, epsilon = 1e-12);
    }

    #[test]
    fn smoothing_two_steps() {
        let mut dlm = local_level(vec![Some(1.0), Some(0.0)], 1.0);
        dlm.forward_filter(0, 1, false).unwrap();
        dlm.backward_smoother(1, None).unwrap();

        let day0 = dlm.result().smoothed(0).unwrap();
        assert_relative_eq!(day0.state[0], 1.0 / 3.0, epsilon = 1e-10);
        assert_relative_eq!(day0.cov[(0, 0)], 0.18518519, epsilon = 1e-8);
        assert_eq!(dlm.result().smoothed_steps(), Some(Watermark::new(0, 1)));
    }

    #[test]
    fn resume_requires_filtered_predecessor() {
        let mut dlm = local_level(vec![Some(1.0); 5], 0.9);
        assert_eq!(
            dlm.forward_filter(2, 4, false),
            Err(DlmError::UnfilteredPredecessor { start: 2 })
        );
        assert!(dlm.result().filtered_steps().is_none());

        dlm.forward_filter(0, 1, false).unwrap();
        dlm.forward_filter(2, 4, false).unwrap();
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 4)));
    }

    #[test]
    fn forget_previous_restarts_watermark() {
        let mut dlm = local_level(vec![Some(1.0); 5], 0.9);
        dlm.forward_filter(0, 4, false).unwrap();
        dlm.forward_filter(3, 4, true).unwrap();
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(3, 4)));
        assert!(dlm.result().filtered(2).is_none());
    }

    #[test]
    fn missing_feature_commits_nothing() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(2.0), Some(3.0)]);
        dlm.add(Trend::new(0, 0.9).unwrap()).unwrap();
        dlm.add(Dynamic::new(vec![vec![1.0], vec![2.0], vec![3.0]], 0.9).unwrap())
            .unwrap();
        dlm.initialize().unwrap();
        dlm.forward_filter(0, 2, false).unwrap();

        dlm.append(vec![Some(4.0)]).unwrap();
        let err = dlm.forward_filter(3, 3, false);
        assert!(matches!(err, Err(DlmError::MissingFeature { step: 3, .. })));
        assert_eq!(dlm.result().filtered_steps(), Some(Watermark::new(0, 2)));
    }

    #[test]
    fn filtering_requires_initialization() {
        let mut dlm = Dlm::new(vec![Some(1.0)]);
        dlm.add(Trend::new(0, 0.9).unwrap()).unwrap();
        assert_eq!(dlm.forward_filter(0, 0, false), Err(DlmError::NotInitialized));
        dlm.fit_forward_filter().unwrap();
        assert!(dlm.is_initialized());
    }

    #[test]
    fn dynamic_features_must_cover_series() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(2.0)]);
        let err = dlm.add(Dynamic::new(vec![vec![1.0]], 0.9).unwrap());
        assert!(matches!(err, Err(DlmError::DimensionMismatch(_))));
    }

    #[test]
    fn autoreg_binds_to_series() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(2.0), Some(3.0)]);
        dlm.add(AutoReg::new(2, 0.9).unwrap()).unwrap();
        let ar = dlm.builder().get("ar2").and_then(|c| c.as_autoreg()).unwrap();
        assert_eq!(ar.data().len(), 3);
    }

    #[test]
    fn smoother_honours_day_limit() {
        let mut dlm = local_level((0..6).map(|i| Some(i as f64)).collect(), 0.9);
        dlm.fit_forward_filter().unwrap();
        dlm.backward_smoother(5, Some(2)).unwrap();
        assert_eq!(dlm.result().smoothed_steps(), Some(Watermark::new(3, 5)));
        assert_eq!(
            dlm.backward_smoother(6, None),
            Err(DlmError::Unfiltered { date: 6 })
        );
    }

    #[test]
    fn nan_observations_are_missing() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(f64::NAN), Some(2.0), Some(3.0)]);
        assert_eq!(dlm.data()[1], None);
        dlm.add(Trend::new(0, 0.9).unwrap()).unwrap();
        dlm.fit_forward_filter().unwrap();

        let means = dlm.access().mean(FilterType::ForwardFilter).unwrap();
        assert!(means.iter().all(|m| m.is_finite()));
        assert!(dlm.mse().unwrap().is_finite());
    }

    #[test]
    fn config_change_rereads_observations() {
        let mut dlm = Dlm::new(vec![Some(1.0), Some(-1.0), Some(2.0)]);
        dlm.add(AutoReg::new(1, 0.9).unwrap()).unwrap();
        let dlm = dlm.with_config(DlmConfig::new().with_missing_sentinel(-1.0));
        assert_eq!(dlm.data(), &[Some(1.0), None, Some(2.0)]);
        let ar = dlm.builder().get("ar1").and_then(|c| c.as_autoreg()).unwrap();
        assert_eq!(ar.data(), dlm.data());
    }

    #[test]
    fn smoothing_needs_filtered_results() {
        let mut dlm = local_level(vec![Some(1.0), Some(2.0)], 0.9);
        assert_eq!(
            dlm.fit_backward_smoother(),
            Err(DlmError::NoResults {
                stream: "forward filter".into()
            })
        );
        assert!(matches!(dlm.mse(), Err(DlmError::NoResults { .. })));
    }

    #[test]
    fn discount_change_invalidates_results() {
        let mut dlm = local_level(vec![Some(1.0), Some(2.0)], 0.9);
        dlm.fit().unwrap();
        dlm.set_discount("trend", 0.5).unwrap();
        assert!(dlm.result().filtered_steps().is_none());
        assert!(dlm.result().smoothed_steps().is_none());

        dlm.fit_forward_filter().unwrap();
        assert!(dlm.mse().unwrap().is_finite());

        dlm.update_discount(&[0.7]).unwrap();
        assert_eq!(dlm.component_discounts(), vec![("trend".to_string(), 0.7)]);
        assert!(dlm.update_discount(&[0.7, 0.7]).is_err());
    }

    #[test]
    fn sample_path_is_seeded_and_leaves_store_alone() {
        let mut dlm = local_level(vec![Some(1.0), Some(1.5), None, Some(2.0)], 0.9);
        dlm.fit().unwrap();
        let before = dlm.result().clone();

        let a = dlm
            .backward_sample(3, None, &mut StdRng::seed_from_u64(7))
            .unwrap();
        let b = dlm
            .backward_sample(3, None, &mut StdRng::seed_from_u64(7))
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.start, 0);
        assert_eq!(a.states.len(), 4);
        assert_eq!(a.observations.len(), 4);
        assert_eq!(dlm.result(), &before);
    }
}
