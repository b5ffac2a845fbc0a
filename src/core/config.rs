//! Model-level configuration.

use crate::filter::InnovationMode;

/// Settings shared by every pass of a [`Dlm`](crate::dlm::Dlm).
#[derive(Debug, Clone, PartialEq)]
pub struct DlmConfig {
    /// Prior observation noise variance; `df` starts at 1.
    pub prior_noise_var: f64,
    /// How the evolution variance couples components.
    pub innovation: InnovationMode,
    /// Raw value treated as a missing observation, in addition to NaN.
    pub missing_sentinel: Option<f64>,
}

impl Default for DlmConfig {
    fn default() -> Self {
        Self {
            prior_noise_var: 1.0,
            innovation: InnovationMode::Whole,
            missing_sentinel: None,
        }
    }
}

impl DlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prior_noise_var(mut self, noise_var: f64) -> Self {
        self.prior_noise_var = noise_var;
        self
    }

    pub fn with_innovation(mut self, mode: InnovationMode) -> Self {
        self.innovation = mode;
        self
    }

    /// Treat `sentinel` in raw input as missing.
    pub fn with_missing_sentinel(mut self, sentinel: f64) -> Self {
        self.missing_sentinel = Some(sentinel);
        self
    }

    /// Convert a raw value to an observation, mapping NaN and the sentinel to `None`.
    pub fn observation(&self, raw: f64) -> Option<f64> {
        if raw.is_nan() || self.missing_sentinel == Some(raw) {
            None
        } else {
            Some(raw)
        }
    }

    /// Normalise an incoming observation so that NaN or the sentinel is `None`.
    pub fn clean(&self, value: Option<f64>) -> Option<f64> {
        value.and_then(|v| self.observation(v))
    }
}
