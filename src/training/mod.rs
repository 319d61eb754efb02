//! Model training
//!
//! Update rules, learning-rate schedules, metrics tracking and the training loop.

pub mod metrics;
pub mod optimizer;
pub mod schedule;
pub mod trainer;

pub use metrics::{EpochReport, Metrics, TrainingHistory};
pub use optimizer::{OptimizerKind, UpdateRule};
pub use schedule::{Schedule, ScheduleKind};
pub use trainer::{evaluate_batch, BatchEval, LoopState, Trainer};
