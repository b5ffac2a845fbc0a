//! Utility functions shared by the model and the tuner.

pub mod metrics;

pub use metrics::{calculate_metrics, AccuracyMetrics};
