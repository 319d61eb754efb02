//! Experiment definitions and the two fixed comparison tasks

use std::collections::HashSet;

use crate::report::{Metric, Panel};
use crate::training::{OptimizerKind, ScheduleKind};
use crate::{LabError, OptimizerTaskConfig, Result, ScheduleTaskConfig};

/// One named configuration: an update rule plus an optional schedule
#[derive(Debug, Clone, PartialEq)]
pub struct RunSpec {
    pub name: String,
    pub optimizer: OptimizerKind,
    pub schedule: Option<ScheduleKind>,
}

impl RunSpec {
    pub fn new(name: impl Into<String>, optimizer: OptimizerKind) -> Self {
        RunSpec {
            name: name.into(),
            optimizer,
            schedule: None,
        }
    }

    pub fn with_schedule(mut self, schedule: ScheduleKind) -> Self {
        self.schedule = Some(schedule);
        self
    }
}

/// Ordered set of configurations trained for the same number of epochs
#[derive(Debug, Clone)]
pub struct Experiment {
    title: String,
    epochs: usize,
    runs: Vec<RunSpec>,
    panels: Vec<Panel>,
    artifact: String,
}

impl Experiment {
    /// Create an experiment, rejecting duplicate configuration names
    pub fn new(
        title: impl Into<String>,
        epochs: usize,
        runs: Vec<RunSpec>,
        panels: Vec<Panel>,
        artifact: impl Into<String>,
    ) -> Result<Self> {
        let title = title.into();
        if epochs == 0 {
            return Err(LabError::Configuration(format!(
                "{} needs at least one epoch",
                title
            )));
        }
        if runs.is_empty() {
            return Err(LabError::Configuration(format!(
                "{} has no configurations",
                title
            )));
        }

        let mut seen = HashSet::new();
        for run in &runs {
            if !seen.insert(run.name.as_str()) {
                return Err(LabError::DuplicateRun(run.name.clone()));
            }
        }

        Ok(Experiment {
            title,
            epochs,
            runs,
            panels,
            artifact: artifact.into(),
        })
    }

    /// Update rules compared at a constant learning rate
    pub fn optimizer_comparison(config: &OptimizerTaskConfig) -> Result<Self> {
        Experiment::new(
            "Optimizer comparison",
            config.epochs,
            vec![
                RunSpec::new("SGD", OptimizerKind::sgd(0.01)),
                RunSpec::new("SGD+Momentum", OptimizerKind::sgd_momentum(0.01, 0.9)),
                RunSpec::new("Adam", OptimizerKind::adam(0.001)),
                RunSpec::new("AdamW", OptimizerKind::adamw(0.001, 0.01)),
            ],
            vec![
                Panel::new(Metric::TrainLoss, "Training Loss", "Loss"),
                Panel::new(Metric::TestAccuracy, "Test Accuracy", "Accuracy (%)"),
            ],
            config.artifact.clone(),
        )
    }

    /// Learning-rate schedules compared on SGD with momentum
    pub fn schedule_comparison(config: &ScheduleTaskConfig) -> Result<Self> {
        let sgd = OptimizerKind::sgd_momentum(config.base_lr, config.momentum);
        Experiment::new(
            "LR schedule comparison",
            config.epochs,
            vec![
                RunSpec::new("Constant (No Scheduler)", sgd),
                RunSpec::new("StepLR", sgd).with_schedule(ScheduleKind::step_decay(5, 0.1)),
                RunSpec::new("CosineAnnealing", sgd)
                    .with_schedule(ScheduleKind::cosine(config.epochs)),
                RunSpec::new("ReduceLROnPlateau", sgd)
                    .with_schedule(ScheduleKind::plateau(0.5, 2)),
            ],
            vec![
                Panel::new(Metric::LearningRate, "Learning Rate per Epoch", "Learning Rate")
                    .log_scale(),
                Panel::new(Metric::TestAccuracy, "Test Accuracy", "Accuracy (%)"),
            ],
            config.artifact.clone(),
        )
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn epochs(&self) -> usize {
        self.epochs
    }

    pub fn runs(&self) -> &[RunSpec] {
        &self.runs
    }

    pub fn panels(&self) -> &[Panel] {
        &self.panels
    }

    /// File name of the comparison image
    pub fn artifact(&self) -> &str {
        &self.artifact
    }
}
