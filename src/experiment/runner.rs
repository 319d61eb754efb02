//! Experiment runner
//!
//! Trains every configuration of an [`Experiment`] in declared order, each
//! from a freshly initialized model, optimizer and schedule.

use burn::tensor::backend::AutodiffBackend;

use crate::data::BatchSource;
use crate::experiment::task::{Experiment, RunSpec};
use crate::model::ClassifierConfig;
use crate::training::{Trainer, TrainingHistory};
use crate::{LabError, Result};

/// Histories keyed by configuration name, in insertion order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperimentResults {
    runs: Vec<(String, TrainingHistory)>,
    failures: Vec<(String, String)>,
}

impl ExperimentResults {
    /// Store a completed history
    pub fn insert(&mut self, name: impl Into<String>, history: TrainingHistory) -> Result<()> {
        let name = name.into();
        if self.contains(&name) {
            return Err(LabError::DuplicateRun(name));
        }
        self.runs.push((name, history));
        Ok(())
    }

    /// Record a configuration that did not complete
    pub fn record_failure(&mut self, name: impl Into<String>, err: &LabError) {
        self.failures.push((name.into(), err.to_string()));
    }

    pub fn get(&self, name: &str) -> Option<&TrainingHistory> {
        self.runs.iter().find(|(n, _)| n == name).map(|(_, h)| h)
    }

    fn contains(&self, name: &str) -> bool {
        self.get(name).is_some() || self.failures.iter().any(|(n, _)| n == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TrainingHistory)> {
        self.runs.iter().map(|(n, h)| (n.as_str(), h))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.runs.iter().map(|(n, _)| n.as_str())
    }

    /// Failed configurations and their error messages
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// Number of completed configurations
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

/// Runs experiments over shared training and evaluation batch sources
pub struct ExperimentRunner<'a, B: AutodiffBackend> {
    device: B::Device,
    seed: u64,
    model: ClassifierConfig,
    train: &'a dyn BatchSource<B>,
    eval: &'a dyn BatchSource<B::InnerBackend>,
    continue_on_failure: bool,
}

impl<'a, B: AutodiffBackend> ExperimentRunner<'a, B> {
    pub fn new(
        device: B::Device,
        model: ClassifierConfig,
        train: &'a dyn BatchSource<B>,
        eval: &'a dyn BatchSource<B::InnerBackend>,
    ) -> Self {
        ExperimentRunner {
            device,
            seed: 42,
            model,
            train,
            eval,
            continue_on_failure: false,
        }
    }

    /// Seed for model initialization, shared by every configuration
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Keep going after a configuration fails instead of aborting the experiment
    pub fn continue_on_failure(mut self, enabled: bool) -> Self {
        self.continue_on_failure = enabled;
        self
    }

    /// Train every configuration and collect their histories
    pub fn run(&self, experiment: &Experiment) -> Result<ExperimentResults> {
        log::info!("{}", "=".repeat(50));
        log::info!("{} ({} epochs)", experiment.title(), experiment.epochs());
        log::info!("{}", "=".repeat(50));

        let mut results = ExperimentResults::default();
        for config in experiment.runs() {
            log::info!("--- Training: {} ---", config.name);
            match self.run_one(config, experiment.epochs()) {
                Ok(history) => results.insert(config.name.as_str(), history)?,
                Err(e) if self.continue_on_failure => {
                    log::error!("{} failed: {}", config.name, e);
                    results.record_failure(config.name.as_str(), &e);
                }
                Err(e) => return Err(e),
            }
        }

        Ok(results)
    }

    fn run_one(&self, config: &RunSpec, epochs: usize) -> Result<TrainingHistory> {
        let base_lr = config.optimizer.learning_rate();
        let optimizer = config.optimizer.init()?;
        let schedule = config.schedule.map(|s| s.build(base_lr)).transpose()?;
        log::debug!(
            "{}: {}{}",
            config.name,
            config.optimizer,
            config.schedule
                .map(|s| format!(", {}", s))
                .unwrap_or_default()
        );

        let model = self.model.init::<B>(&self.device, self.seed);
        let mut trainer = Trainer::new(model, optimizer, base_lr, schedule, &self.device);
        trainer.fit(epochs, self.train, self.eval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use burn::backend::{Autodiff, NdArray};
    use burn::data::dataloader::DataLoader;
    use burn::tensor::backend::Backend;

    use crate::data::{BatchLoader, ClassBatch, ClassificationDataset};
    use crate::training::OptimizerKind;
    use crate::{OptimizerTaskConfig, Phase, ScheduleTaskConfig};

    type Inner = NdArray<f32>;
    type TestBackend = Autodiff<Inner>;

    const MODEL: ClassifierConfig = ClassifierConfig {
        input_dim: 8,
        hidden_dim: 16,
        num_classes: 3,
    };

    fn loaders() -> (BatchLoader<TestBackend>, BatchLoader<Inner>) {
        let (train, test) = ClassificationDataset::synthetic_pair(64, 32, 8, 3, 5).unwrap();
        (
            BatchLoader::new(Arc::new(train), 16, Default::default())
                .unwrap()
                .shuffle(5),
            BatchLoader::new(Arc::new(test), 32, Default::default()).unwrap(),
        )
    }

    #[test]
    fn test_optimizer_task_produces_history_per_configuration() {
        let (train, eval) = loaders();
        let runner = ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval);
        let task = Experiment::optimizer_comparison(&OptimizerTaskConfig {
            epochs: 2,
            ..Default::default()
        })
        .unwrap();

        let results = runner.run(&task).unwrap();

        let names: Vec<&str> = results.names().collect();
        assert_eq!(names, vec!["SGD", "SGD+Momentum", "Adam", "AdamW"]);
        for (_, history) in results.iter() {
            assert_eq!(history.len(), 2);
            assert_eq!(history.test_acc.len(), 2);
            assert_eq!(history.lr.len(), 2);
        }
        assert_eq!(results.get("Adam").unwrap().lr, vec![0.001, 0.001]);
        assert!(results.failures().is_empty());
    }

    #[test]
    fn test_schedule_task_records_learning_rates() {
        let (train, eval) = loaders();
        let runner = ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval);
        let task = Experiment::schedule_comparison(&ScheduleTaskConfig {
            epochs: 6,
            ..Default::default()
        })
        .unwrap();

        let results = runner.run(&task).unwrap();
        assert_eq!(results.len(), 4);

        assert_eq!(results.get("Constant (No Scheduler)").unwrap().lr, vec![0.05; 6]);

        let step = &results.get("StepLR").unwrap().lr;
        assert_relative_eq!(step[4], 0.05);
        assert_relative_eq!(step[5], 0.005, epsilon = 1e-12);

        let cosine = &results.get("CosineAnnealing").unwrap().lr;
        assert_relative_eq!(cosine[0], 0.05);
        assert!(cosine.windows(2).all(|w| w[1] < w[0]));

        let plateau = &results.get("ReduceLROnPlateau").unwrap().lr;
        assert!(plateau.windows(2).all(|w| w[1] <= w[0]));
    }

    #[test]
    fn test_default_optimizer_task_runs_ten_epochs() {
        let (train, eval) = loaders();
        let runner = ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval);
        let task = Experiment::optimizer_comparison(&OptimizerTaskConfig::default()).unwrap();

        let results = runner.run(&task).unwrap();

        assert_eq!(results.len(), 4);
        for (name, history) in results.iter() {
            assert_eq!(history.len(), 10, "{name}");
            assert_eq!(history.train_loss.len(), 10);
            assert_eq!(history.test_acc.len(), 10);
            assert_eq!(history.lr.len(), 10);
        }
    }

    #[test]
    fn test_runs_are_reproducible() {
        let (train, eval) = loaders();
        let task = Experiment::optimizer_comparison(&OptimizerTaskConfig {
            epochs: 2,
            ..Default::default()
        })
        .unwrap();

        let run = || {
            ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval)
                .with_seed(7)
                .run(&task)
                .unwrap()
        };
        let first = run();
        let second = run();

        assert_eq!(first, second);
    }

    /// Counts how many loaders were handed out
    struct CountingSource<'a, B: Backend> {
        inner: &'a dyn BatchSource<B>,
        calls: Cell<usize>,
    }

    impl<'a, B: Backend> CountingSource<'a, B> {
        fn new(inner: &'a dyn BatchSource<B>) -> Self {
            CountingSource {
                inner,
                calls: Cell::new(0),
            }
        }
    }

    impl<B: Backend> BatchSource<B> for CountingSource<'_, B> {
        fn num_batches(&self) -> usize {
            self.inner.num_batches()
        }

        fn loader(&self, epoch: usize) -> Arc<dyn DataLoader<B, ClassBatch<B>>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.loader(epoch)
        }
    }

    fn task_with_bad_run() -> Experiment {
        Experiment::new(
            "failing",
            1,
            vec![
                RunSpec::new("ok-before", OptimizerKind::sgd(0.05)),
                RunSpec::new("broken", OptimizerKind::sgd(0.0)),
                RunSpec::new("ok-after", OptimizerKind::adam(0.001)),
            ],
            Vec::new(),
            "failing.png",
        )
        .unwrap()
    }

    fn task_with_diverging_run() -> Experiment {
        Experiment::new(
            "diverging",
            1,
            vec![
                RunSpec::new("ok-before", OptimizerKind::sgd(0.05)),
                RunSpec::new("diverging", OptimizerKind::sgd(1e300)),
                RunSpec::new("ok-after", OptimizerKind::adam(0.001)),
            ],
            Vec::new(),
            "diverging.png",
        )
        .unwrap()
    }

    #[test]
    fn test_failure_aborts_by_default() {
        let (train, eval) = loaders();
        let runner = ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval);

        let err = runner.run(&task_with_bad_run()).unwrap_err();
        assert!(matches!(err, LabError::Configuration(_)));
    }

    #[test]
    fn test_failure_is_recorded_when_continuing() {
        let (train, eval) = loaders();
        let runner = ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &train, &eval)
            .continue_on_failure(true);

        let results = runner.run(&task_with_bad_run()).unwrap();

        let names: Vec<&str> = results.names().collect();
        assert_eq!(names, vec!["ok-before", "ok-after"]);
        assert_eq!(results.failures().len(), 1);
        assert_eq!(results.failures()[0].0, "broken");
    }

    #[test]
    fn test_training_divergence_stops_later_runs() {
        let (train, eval) = loaders();
        let counted = CountingSource::<TestBackend>::new(&train);
        let runner =
            ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &counted, &eval);

        let err = runner.run(&task_with_diverging_run()).unwrap_err();

        assert!(
            matches!(
                err,
                LabError::NumericFailure {
                    phase: Phase::Training,
                    epoch: 1,
                    ..
                }
            ),
            "unexpected error: {err}"
        );
        // One epoch each for ok-before and the diverging run, none for ok-after
        assert_eq!(counted.calls.get(), 2);
    }

    #[test]
    fn test_training_divergence_is_recorded_when_continuing() {
        let (train, eval) = loaders();
        let counted = CountingSource::<TestBackend>::new(&train);
        let runner =
            ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &counted, &eval)
                .continue_on_failure(true);

        let results = runner.run(&task_with_diverging_run()).unwrap();

        let names: Vec<&str> = results.names().collect();
        assert_eq!(names, vec!["ok-before", "ok-after"]);
        assert_eq!(results.failures().len(), 1);
        assert_eq!(results.failures()[0].0, "diverging");
        assert_eq!(counted.calls.get(), 3);
    }

    #[test]
    fn test_empty_evaluation_source_aborts_first_run() {
        let (train, _) = loaders();
        let empty = ClassificationDataset::from_samples(Vec::new(), 8, 3).unwrap();
        let eval = BatchLoader::<Inner>::new(Arc::new(empty), 32, Default::default()).unwrap();
        let counted = CountingSource::<TestBackend>::new(&train);
        let runner =
            ExperimentRunner::<TestBackend>::new(Default::default(), MODEL, &counted, &eval);

        let err = runner.run(&task_with_diverging_run()).unwrap_err();

        assert!(matches!(
            err,
            LabError::DataExhaustion {
                phase: Phase::Evaluation,
                epoch: 1
            }
        ));
        assert_eq!(counted.calls.get(), 0);
    }

    #[test]
    fn test_results_reject_duplicate_names() {
        let mut results = ExperimentResults::default();
        results.insert("SGD", TrainingHistory::new()).unwrap();
        assert!(matches!(
            results.insert("SGD", TrainingHistory::new()),
            Err(LabError::DuplicateRun(_))
        ));
        assert_eq!(results.len(), 1);
    }
}
