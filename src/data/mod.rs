//! Data sources
//!
//! Classification datasets and the batch loaders that feed the trainer.

pub mod dataset;
pub mod loader;

pub use dataset::{ClassBatch, ClassBatcher, ClassSample, ClassificationDataset};
pub use loader::{BatchLoader, BatchSource};
