pub mod api;
pub mod core;

pub use crate::core::{FundSimulator, ScenarioParameters, SimError, SimulationConfig};
