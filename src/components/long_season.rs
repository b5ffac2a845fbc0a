//! Long-season component: piecewise-constant effects over long cycles.

use super::{assemble, Block, ComponentKind, StateComponent, DEFAULT_PRIOR_SCALE};
use crate::error::{DlmError, Result};
use nalgebra::{DMatrix, DVector};

/// Seasonality whose seasons last `stay` steps each, cycling over `period` seasons.
///
/// Useful for effects such as "month of year" on daily data, where the
/// season changes only every few observations. The evaluation at step `t` is
/// the indicator of season `(t / stay) % period`.
#[derive(Debug, Clone, PartialEq)]
pub struct LongSeason {
    period: usize,
    stay: usize,
    prior_scale: f64,
    block: Block,
}

impl LongSeason {
    pub fn new(period: usize, stay: usize, discount: f64) -> Result<Self> {
        if period < 2 || stay == 0 {
            return Err(DlmError::InvalidParameter(format!(
                "long season requires period >= 2 and stay >= 1, got period={} stay={}",
                period, stay
            )));
        }
        let mut season = Self {
            period,
            stay,
            prior_scale: DEFAULT_PRIOR_SCALE,
            block: Block::new("long_season", period, discount)?,
        };
        assemble(&mut season)?;
        Ok(season)
    }

    pub fn with_prior_scale(mut self, w: f64) -> Self {
        self.prior_scale = w;
        self.block.cov_prior = self.create_cov_prior();
        self
    }

    pub fn period(&self) -> usize {
        self.period
    }

    pub fn stay(&self) -> usize {
        self.stay
    }

    /// Index of the active season at step `t`.
    pub fn season_at(&self, step: usize) -> usize {
        (step / self.stay) % self.period
    }
}

impl StateComponent for LongSeason {
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
        let mut evaluation = DVector::zeros(self.period);
        evaluation[self.season_at(step)] = 1.0;
        Ok(evaluation)
    }

    fn create_transition(&self) -> DMatrix<f64> {
        DMatrix::identity(self.period, self.period)
    }

    fn create_mean_prior(&self) -> DVector<f64> {
        DVector::zeros(self.period)
    }

    fn create_cov_prior(&self) -> DMatrix<f64> {
        DMatrix::identity(self.period, self.period) * self.prior_scale
    }
}
