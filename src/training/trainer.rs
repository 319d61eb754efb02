//! Training loop and evaluation
//!
//! One [`Trainer`] owns one model, its optimizer and optional schedule for a
//! single run. Training steps use the autodiff backend; evaluation runs on
//! the inner backend obtained from [`AutodiffModule::valid`], so no gradients
//! are tracked and parameters cannot change.

use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLoss, CrossEntropyLossConfig};
use burn::optim::GradientsParams;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::ElementConversion;

use crate::data::{BatchSource, ClassBatch};
use crate::model::MlpClassifier;
use crate::training::metrics::{EpochReport, Metrics, TrainingHistory};
use crate::training::optimizer::UpdateRule;
use crate::training::schedule::Schedule;
use crate::{LabError, Phase, Result};

/// Result of evaluating one batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchEval {
    pub loss: f64,
    pub correct: usize,
    pub batch_size: usize,
}

/// Evaluate one batch: loss plus argmax correctness count.
///
/// Pass a model on a non-autodiff backend (see [`AutodiffModule::valid`]).
pub fn evaluate_batch<B: Backend>(
    model: &MlpClassifier<B>,
    criterion: &CrossEntropyLoss<B>,
    batch: &ClassBatch<B>,
    epoch: usize,
) -> Result<BatchEval> {
    let scores = model.forward(batch.images.clone());
    let loss = criterion.forward(scores.clone(), batch.targets.clone());
    let loss = finite_loss(loss.into_scalar().elem::<f64>(), Phase::Evaluation, epoch)?;

    let correct = scores
        .argmax(1)
        .squeeze::<1>(1)
        .equal(batch.targets.clone())
        .int()
        .sum()
        .into_scalar()
        .elem::<i64>() as usize;

    Ok(BatchEval {
        loss,
        correct,
        batch_size: batch.size(),
    })
}

fn finite_loss(value: f64, phase: Phase, epoch: usize) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LabError::NumericFailure {
            phase,
            epoch,
            value,
        })
    }
}

/// Lifecycle of a training run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    /// Currently in (or failed during) the given one-based epoch
    Running { epoch: usize },
    Complete,
}

/// Trainer for a single configuration
pub struct Trainer<B: AutodiffBackend> {
    model: MlpClassifier<B>,
    optimizer: UpdateRule<B, MlpClassifier<B>>,
    schedule: Option<Schedule>,
    base_lr: f64,
    criterion: CrossEntropyLoss<B>,
    eval_criterion: CrossEntropyLoss<B::InnerBackend>,
    state: LoopState,
    history: TrainingHistory,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create a new trainer.
    ///
    /// Without a schedule the learning rate stays at `base_lr` for the whole run.
    pub fn new(
        model: MlpClassifier<B>,
        optimizer: UpdateRule<B, MlpClassifier<B>>,
        base_lr: f64,
        schedule: Option<Schedule>,
        device: &B::Device,
    ) -> Self {
        Trainer {
            model,
            optimizer,
            schedule,
            base_lr,
            criterion: CrossEntropyLossConfig::new().init(device),
            eval_criterion: CrossEntropyLossConfig::new().init(device),
            state: LoopState::NotStarted,
            history: TrainingHistory::new(),
        }
    }

    /// Learning rate the next training step will use
    pub fn learning_rate(&self) -> f64 {
        self.schedule
            .as_ref()
            .map_or(self.base_lr, Schedule::current_lr)
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Get the current model
    pub fn model(&self) -> &MlpClassifier<B> {
        &self.model
    }

    /// Forward, loss, backward and one optimizer update. Returns the batch loss.
    ///
    /// A non-finite loss or gradient aborts before the parameters are touched.
    pub fn train_step(&mut self, batch: &ClassBatch<B>, epoch: usize) -> Result<f64> {
        let lr = self.learning_rate();

        // Gradients are collected fresh from this loss's graph, nothing carries over
        let scores = self.model.forward(batch.images.clone());
        let loss = self.criterion.forward(scores, batch.targets.clone());
        let loss_val = finite_loss(loss.clone().into_scalar().elem::<f64>(), Phase::Training, epoch)?;

        let grads = loss.backward();
        let magnitude = self.model.gradient_l1(&grads);
        if !magnitude.is_finite() {
            return Err(LabError::NumericFailure {
                phase: Phase::Training,
                epoch,
                value: magnitude,
            });
        }

        let grads = GradientsParams::from_grads(grads, &self.model);
        self.model = self.optimizer.step(lr, self.model.clone(), grads);

        Ok(loss_val)
    }

    /// Train over every training batch, evaluate over every evaluation
    /// batch, then advance the schedule once.
    ///
    /// The reported learning rate is the one in effect during this epoch's
    /// training steps, captured before the schedule advances.
    pub fn run_epoch(
        &mut self,
        epoch: usize,
        train: &dyn BatchSource<B>,
        eval: &dyn BatchSource<B::InnerBackend>,
    ) -> Result<EpochReport> {
        if train.num_batches() == 0 {
            return Err(LabError::DataExhaustion {
                phase: Phase::Training,
                epoch,
            });
        }
        if eval.num_batches() == 0 {
            return Err(LabError::DataExhaustion {
                phase: Phase::Evaluation,
                epoch,
            });
        }

        let learning_rate = self.learning_rate();

        let mut train_metrics = Metrics::new();
        let train_loader = train.loader(epoch - 1);
        for batch in train_loader.iter() {
            let loss = self.train_step(&batch, epoch)?;
            train_metrics.record_loss(loss);
        }
        let train_summary = train_metrics.finalize(Phase::Training, epoch)?;

        let model = self.model.valid();
        let mut eval_metrics = Metrics::new();
        let eval_loader = eval.loader(epoch - 1);
        for batch in eval_loader.iter() {
            let result = evaluate_batch(&model, &self.eval_criterion, &batch, epoch)?;
            eval_metrics.record_eval(result.loss, result.correct, result.batch_size);
        }
        let eval_summary = eval_metrics.finalize(Phase::Evaluation, epoch)?;

        if let Some(schedule) = self.schedule.as_mut() {
            let signal = schedule.consumes_loss().then_some(eval_summary.mean_loss);
            schedule.step(signal)?;
        }

        Ok(EpochReport {
            epoch,
            learning_rate,
            train_loss: train_summary.mean_loss,
            val_loss: eval_summary.mean_loss,
            test_accuracy: eval_summary.accuracy.unwrap_or(0.0),
        })
    }

    /// Run `epochs` epochs and return the completed history.
    ///
    /// Any failure aborts the run immediately; a trainer runs at most once.
    pub fn fit(
        &mut self,
        epochs: usize,
        train: &dyn BatchSource<B>,
        eval: &dyn BatchSource<B::InnerBackend>,
    ) -> Result<TrainingHistory> {
        if self.state != LoopState::NotStarted {
            return Err(LabError::Configuration(format!(
                "training loop cannot start from state {:?}",
                self.state
            )));
        }
        if epochs == 0 {
            return Err(LabError::Configuration(
                "epoch count must be at least 1".to_string(),
            ));
        }

        for epoch in 1..=epochs {
            self.state = LoopState::Running { epoch };
            let report = self.run_epoch(epoch, train, eval)?;
            self.history.record_epoch(&report);
            log::info!("  {}", report);
        }

        self.state = LoopState::Complete;
        Ok(self.history.clone())
    }
}
