//! # anofox-dlm
//!
//! Bayesian dynamic linear models with discount-weighted Kalman filtering.
//!
//! A model is composed from structural components (trend, seasonality,
//! dynamic regression, autoregression, long seasons) that are assembled
//! into one block-diagonal state space. The [`Dlm`](dlm::Dlm) orchestrator
//! runs forward filtering with online observation-variance learning,
//! Rauch-Tung-Striebel smoothing, backward sampling and multi-step
//! prediction, and keeps its results consistent while the series is
//! appended to, shortened or edited.

#![allow(clippy::needless_range_loop)]

pub mod components;
pub mod core;
pub mod dlm;
pub mod error;
pub mod filter;
pub mod linalg;
pub mod model;
pub mod tuner;
pub mod utils;

pub use error::{DlmError, Result};

pub mod prelude {
    pub use crate::components::{
        AutoReg, Component, Dynamic, LongSeason, Seasonality, StateComponent, TimeVarying, Trend,
    };
    pub use crate::core::{DlmConfig, Forecast};
    pub use crate::dlm::{Access, Dlm, FeatureOverrides, FilterType, SamplePath};
    pub use crate::error::{DlmError, Result};
    pub use crate::filter::InnovationMode;
    pub use crate::tuner::{ModelTuner, TuneResult, TunerConfig};
    pub use crate::utils::{calculate_metrics, AccuracyMetrics};
}
