pub mod config;
pub mod db;
pub mod models;
pub mod simulation;

pub use simulation::{RunSummary, SimulationConfig, SimulationError, SimulationRunner};
