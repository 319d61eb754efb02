//! Comparison experiments

pub mod runner;
pub mod task;

pub use runner::{ExperimentResults, ExperimentRunner};
pub use task::{Experiment, RunSpec};
