//! Neural network architecture
//!
//! A single fixed classifier: a two-layer perceptron over flattened images.

pub mod mlp;

pub use mlp::{ClassifierConfig, MlpClassifier};
