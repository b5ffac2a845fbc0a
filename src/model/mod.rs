//! State-space model assembly.

mod builder;
mod state_space;

pub use builder::ModelBuilder;
pub use state_space::{ForecastState, StateSpaceModel};
