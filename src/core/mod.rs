//! Configuration and forecast output shared across the crate.

mod config;
mod forecast;

pub use config::DlmConfig;
pub use forecast::Forecast;
pub(crate) use forecast::t_quantile;
