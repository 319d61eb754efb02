//! Optimizer and learning-rate schedule comparison experiments
//!
//! Trains a small fully-connected classifier under several update rules and
//! schedules, records per-epoch metrics, and renders comparison plots.

pub mod data;
pub mod experiment;
pub mod model;
pub mod report;
pub mod training;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Phase of an epoch in which a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Evaluation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Training => write!(f, "training"),
            Phase::Evaluation => write!(f, "evaluation"),
        }
    }
}

/// Application-wide errors
#[derive(Debug, Error)]
pub enum LabError {
    #[error("No {phase} batches in epoch {epoch}")]
    DataExhaustion { phase: Phase, epoch: usize },

    #[error("Non-finite {phase} loss or gradient ({value}) in epoch {epoch}")]
    NumericFailure {
        phase: Phase,
        epoch: usize,
        value: f64,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Duplicate run name: {0}")]
    DuplicateRun(String),

    #[error("Failed to render report: {0}")]
    Reporting(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LabError>;

/// Application configuration loaded from optlab.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub run: RunConfig,
    pub data: DataConfig,
    pub model: ModelConfig,
    pub optimizer_task: OptimizerTaskConfig,
    pub schedule_task: ScheduleTaskConfig,
}

/// Compute device, chosen once per process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceKind::Cpu => write!(f, "CPU (NdArray)"),
            DeviceKind::Gpu => write!(f, "GPU (Wgpu)"),
        }
    }
}

/// Where training and test samples come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceKind {
    Mnist,
    Synthetic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub seed: u64,
    pub device: DeviceKind,
    pub output_dir: String,
    /// Keep running the remaining configurations of a task after one fails
    pub continue_on_failure: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            seed: 42,
            device: DeviceKind::Cpu,
            output_dir: ".".to_string(),
            continue_on_failure: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub source: DataSourceKind,
    pub train_batch_size: usize,
    pub test_batch_size: usize,
    pub synthetic_train_samples: usize,
    pub synthetic_test_samples: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            source: DataSourceKind::Mnist,
            train_batch_size: 64,
            test_batch_size: 1000,
            synthetic_train_samples: 6000,
            synthetic_test_samples: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            input_dim: 28 * 28,
            hidden_dim: 256,
            num_classes: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerTaskConfig {
    pub epochs: usize,
    pub artifact: String,
}

impl Default for OptimizerTaskConfig {
    fn default() -> Self {
        OptimizerTaskConfig {
            epochs: 10,
            artifact: "optimizer_comparison.png".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleTaskConfig {
    pub epochs: usize,
    /// Starts high so the schedules have something to decay
    pub base_lr: f64,
    pub momentum: f64,
    pub artifact: String,
}

impl Default for ScheduleTaskConfig {
    fn default() -> Self {
        ScheduleTaskConfig {
            epochs: 15,
            base_lr: 0.05,
            momentum: 0.9,
            artifact: "scheduler_comparison.png".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            LabError::Config(format!("Failed to read config file {}: {}", path, e))
        })?;
        toml::from_str(&content)
            .map_err(|e| LabError::Config(format!("Failed to parse config: {}", e)))
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| LabError::Config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
