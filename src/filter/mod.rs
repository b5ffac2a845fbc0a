//! Kalman recursions and the store their results are committed to.

mod kalman;
mod result;

pub use kalman::{InnovationMode, KalmanFilter};
pub use result::{Estimate, ResultStore, StepRecord, Watermark};
