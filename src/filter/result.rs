//! Time-indexed storage for filtered, predicted and smoothed estimates.

use crate::model::StateSpaceModel;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Observation and latent moments at one time index.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub obs: f64,
    pub obs_var: f64,
    pub state: DVector<f64>,
    pub cov: DMatrix<f64>,
}

impl Estimate {
    /// Snapshot of the committed estimate.
    pub fn posterior(model: &StateSpaceModel) -> Self {
        Self {
            obs: model.obs,
            obs_var: model.obs_var,
            state: model.state.clone(),
            cov: model.sys_var.clone(),
        }
    }

    /// Snapshot of the forecast sub-state.
    pub fn prediction(model: &StateSpaceModel) -> Self {
        Self {
            obs: model.forecast.obs,
            obs_var: model.forecast.obs_var,
            state: model.forecast.state.clone(),
            cov: model.forecast.sys_var.clone(),
        }
    }
}

/// Inclusive range `[lo, hi]` of indices holding valid results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub lo: usize,
    pub hi: usize,
}

impl Watermark {
    pub fn new(lo: usize, hi: usize) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, t: usize) -> bool {
        self.lo <= t && t <= self.hi
    }

    /// Number of indices covered.
    pub fn span(&self) -> usize {
        self.hi - self.lo + 1
    }
}

/// Everything one forward-filter step produces.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub filtered: Estimate,
    pub predicted: Estimate,
    pub noise_var: f64,
    pub df: f64,
}

/// Per-step results plus the watermarks that say which of them are valid.
///
/// Slots outside a watermark may hold stale values and are never read
/// through the public getters.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultStore {
    filtered: Vec<Option<Estimate>>,
    predicted: Vec<Option<Estimate>>,
    smoothed: Vec<Option<Estimate>>,
    noise_var: Vec<Option<f64>>,
    df: Vec<Option<f64>>,
    filtered_steps: Option<Watermark>,
    smoothed_steps: Option<Watermark>,
}

impl ResultStore {
    /// Empty store for a series of length `n`.
    pub fn new(n: usize) -> Self {
        let mut store = Self::default();
        store.extend(n);
        store
    }

    pub fn len(&self) -> usize {
        self.filtered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filtered.is_empty()
    }

    /// Add `k` empty slots at the end. Watermarks are kept.
    pub fn extend(&mut self, k: usize) {
        let n = self.len() + k;
        self.filtered.resize(n, None);
        self.predicted.resize(n, None);
        self.smoothed.resize(n, None);
        self.noise_var.resize(n, None);
        self.df.resize(n, None);
    }

    /// Drop slot `date`; later slots shift down by one.
    pub fn remove(&mut self, date: usize) {
        if date >= self.len() {
            return;
        }
        self.filtered.remove(date);
        self.predicted.remove(date);
        self.smoothed.remove(date);
        self.noise_var.remove(date);
        self.df.remove(date);
    }

    /// Invalidate every filtered result at or after `date` and all smoothed results.
    pub fn retract_from(&mut self, date: usize) {
        self.filtered_steps = match self.filtered_steps {
            Some(w) if date > w.lo => Some(Watermark::new(w.lo, w.hi.min(date - 1))),
            _ => None,
        };
        debug!(date, filtered = ?self.filtered_steps, "watermark retracted");
        self.clear_smoothed();
    }

    /// Invalidate everything.
    pub fn invalidate_all(&mut self) {
        self.filtered_steps = None;
        self.clear_smoothed();
    }

    fn clear_smoothed(&mut self) {
        self.smoothed_steps = None;
        self.smoothed.iter_mut().for_each(|s| *s = None);
    }

    /// Write a contiguous run of forward-filter results starting at `start`
    /// and set the filtered watermark to `[lo, start + records.len() - 1]`.
    pub fn commit_filtered(&mut self, start: usize, lo: usize, records: Vec<StepRecord>) {
        if records.is_empty() {
            return;
        }
        let hi = start + records.len() - 1;
        for (t, record) in (start..).zip(records) {
            self.filtered[t] = Some(record.filtered);
            self.predicted[t] = Some(record.predicted);
            self.noise_var[t] = Some(record.noise_var);
            self.df[t] = Some(record.df);
        }
        self.filtered_steps = Some(Watermark::new(lo, hi));
        self.clear_smoothed();
        debug!(lo, hi, "filtered watermark set");
    }

    /// Write smoothed results for `[lo, lo + estimates.len() - 1]`.
    pub fn commit_smoothed(&mut self, lo: usize, estimates: Vec<Estimate>) {
        if estimates.is_empty() {
            return;
        }
        self.clear_smoothed();
        let hi = lo + estimates.len() - 1;
        for (t, estimate) in (lo..).zip(estimates) {
            self.smoothed[t] = Some(estimate);
        }
        self.smoothed_steps = Some(Watermark::new(lo, hi));
        debug!(lo, hi, "smoothed watermark set");
    }

    pub fn filtered_steps(&self) -> Option<Watermark> {
        self.filtered_steps
    }

    pub fn smoothed_steps(&self) -> Option<Watermark> {
        self.smoothed_steps
    }

    fn valid<T>(slots: &[Option<T>], steps: Option<Watermark>, t: usize) -> Option<&T> {
        steps
            .filter(|w| w.contains(t))
            .and_then(|_| slots.get(t))
            .and_then(Option::as_ref)
    }

    pub fn filtered(&self, t: usize) -> Option<&Estimate> {
        Self::valid(&self.filtered, self.filtered_steps, t)
    }

    /// One-step prediction made for `t` from `t - 1`.
    pub fn predicted(&self, t: usize) -> Option<&Estimate> {
        Self::valid(&self.predicted, self.filtered_steps, t)
    }

    pub fn smoothed(&self, t: usize) -> Option<&Estimate> {
        Self::valid(&self.smoothed, self.smoothed_steps, t)
    }

    pub fn noise_var(&self, t: usize) -> Option<f64> {
        Self::valid(&self.noise_var, self.filtered_steps, t).copied()
    }

    pub fn df(&self, t: usize) -> Option<f64> {
        Self::valid(&self.df, self.filtered_steps, t).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate(v: f64) -> Estimate {
        Estimate {
            obs: v,
            obs_var: 1.0,
            state: DVector::from_element(1, v),
            cov: DMatrix::identity(1, 1),
        }
    }

    fn record(v: f64) -> StepRecord {
        StepRecord {
            filtered: estimate(v),
            predicted: estimate(v - 0.5),
            noise_var: 1.0,
            df: v,
        }
    }

    fn filled(n: usize, hi: usize) -> ResultStore {
        let mut store = ResultStore::new(n);
        store.commit_filtered(0, 0, (0..=hi).map(|t| record(t as f64)).collect());
        store
    }

    #[test]
    fn getters_respect_watermark() {
        let store = filled(5, 2);
        assert_eq!(store.filtered_steps(), Some(Watermark::new(0, 2)));
        assert_eq!(store.filtered(2).map(|e| e.obs), Some(2.0));
        assert!(store.filtered(3).is_none());
        assert_eq!(store.predicted(1).map(|e| e.obs), Some(0.5));
        assert_eq!(store.df(2), Some(2.0));
        assert!(store.smoothed(0).is_none());
    }

    #[test]
    fn resumed_commit_keeps_low_mark() {
        let mut store = filled(6, 2);
        store.commit_filtered(3, 0, vec![record(3.0), record(4.0)]);
        assert_eq!(store.filtered_steps(), Some(Watermark::new(0, 4)));
        assert_eq!(store.filtered(4).map(|e| e.obs), Some(4.0));
    }

    #[test]
    fn retraction_shrinks_or_clears() {
        let mut store = filled(6, 4);
        store.commit_smoothed(0, vec![estimate(0.0), estimate(1.0)]);

        store.retract_from(3);
        assert_eq!(store.filtered_steps(), Some(Watermark::new(0, 2)));
        assert!(store.smoothed_steps().is_none());
        assert!(store.smoothed(0).is_none());

        store.retract_from(5);
        assert_eq!(store.filtered_steps(), Some(Watermark::new(0, 2)));

        store.retract_from(0);
        assert!(store.filtered_steps().is_none());
    }

    #[test]
    fn remove_and_extend_resize_all_streams() {
        let mut store = filled(4, 3);
        store.retract_from(1);
        store.remove(1);
        assert_eq!(store.len(), 3);
        store.extend(2);
        assert_eq!(store.len(), 5);
        assert_eq!(store.filtered_steps(), Some(Watermark::new(0, 0)));
        assert_eq!(store.filtered(0).map(|e| e.obs), Some(0.0));
    }

    #[test]
    fn watermark_contains_is_inclusive() {
        let w = Watermark::new(2, 4);
        assert!(w.contains(2));
        assert!(w.contains(4));
        assert!(!w.contains(5));
        assert_eq!(w.span(), 3);
    }
}
