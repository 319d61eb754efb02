//! Training metrics and history

use std::fmt;

use crate::{LabError, Phase, Result};

/// Running totals accumulated over one phase of one epoch
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    /// Sum of per-batch mean losses
    pub total_loss: f64,
    /// Number of correct predictions
    pub correct: usize,
    /// Number of predictions counted towards accuracy
    pub total_predictions: usize,
    /// Number of batches accumulated
    pub batch_count: usize,
}

/// Epoch-level scalars produced by [`Metrics::finalize`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochSummary {
    /// Mean of the per-batch losses
    pub mean_loss: f64,
    /// Accuracy percentage, present when correctness counts were recorded
    pub accuracy: Option<f64>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a training batch loss
    pub fn record_loss(&mut self, loss: f64) {
        self.total_loss += loss;
        self.batch_count += 1;
    }

    /// Record an evaluation batch result
    pub fn record_eval(&mut self, loss: f64, correct: usize, batch_size: usize) {
        self.record_loss(loss);
        self.correct += correct;
        self.total_predictions += batch_size;
    }

    /// Mean loss and accuracy for the epoch.
    ///
    /// Fails with [`LabError::DataExhaustion`] when no batch was recorded.
    pub fn finalize(&self, phase: Phase, epoch: usize) -> Result<EpochSummary> {
        if self.batch_count == 0 {
            return Err(LabError::DataExhaustion { phase, epoch });
        }

        let accuracy = (self.total_predictions > 0)
            .then(|| 100.0 * self.correct as f64 / self.total_predictions as f64);

        Ok(EpochSummary {
            mean_loss: self.total_loss / self.batch_count as f64,
            accuracy,
        })
    }
}

/// Outcome of one completed epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpochReport {
    /// One-based epoch index
    pub epoch: usize,
    /// Learning rate used by this epoch's training steps
    pub learning_rate: f64,
    pub train_loss: f64,
    pub val_loss: f64,
    /// Test accuracy percentage
    pub test_accuracy: f64,
}

impl fmt::Display for EpochReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {:02} | LR: {:.6} | Train Loss: {:.4} | Val Loss: {:.4} | Test Acc: {:.2}%",
            self.epoch, self.learning_rate, self.train_loss, self.val_loss, self.test_accuracy
        )
    }
}

/// Per-epoch time series of one training run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_loss: Vec<f64>,
    pub test_acc: Vec<f64>,
    pub lr: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record metrics for an epoch
    pub fn record_epoch(&mut self, report: &EpochReport) {
        self.train_loss.push(report.train_loss);
        self.test_acc.push(report.test_accuracy);
        self.lr.push(report.learning_rate);
    }

    /// Number of completed epochs
    pub fn len(&self) -> usize {
        self.train_loss.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_loss.is_empty()
    }

    pub fn final_train_loss(&self) -> Option<f64> {
        self.train_loss.last().copied()
    }

    pub fn final_accuracy(&self) -> Option<f64> {
        self.test_acc.last().copied()
    }

    /// Best test accuracy and its one-based epoch
    pub fn best_accuracy(&self) -> Option<(usize, f64)> {
        self.test_acc
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .map(|(i, acc)| (i + 1, acc))
    }
}
