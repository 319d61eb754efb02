//! Restartable batch sources
//!
//! A [`BatchSource`] hands out a burn data loader for each epoch. The
//! training loader is rebuilt every epoch with a shuffle seed derived from
//! the run seed and the epoch index, so every configuration sees the same
//! order in the same epoch regardless of what ran before it.

use std::sync::Arc;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::tensor::backend::Backend;

use crate::data::dataset::{ClassBatch, ClassBatcher, ClassificationDataset};
use crate::{LabError, Result};

/// Finite, restartable sequence of batches
pub trait BatchSource<B: Backend> {
    /// Number of batches yielded per epoch
    fn num_batches(&self) -> usize;

    /// Loader for the given (zero-based) epoch
    fn loader(&self, epoch: usize) -> Arc<dyn DataLoader<B, ClassBatch<B>>>;
}

/// Batch loader over a shared in-memory dataset
pub struct BatchLoader<B: Backend> {
    dataset: Arc<ClassificationDataset>,
    batch_size: usize,
    shuffle_seed: Option<u64>,
    device: B::Device,
    /// Built once when the order never changes
    fixed: Option<Arc<dyn DataLoader<B, ClassBatch<B>>>>,
}

impl<B: Backend> BatchLoader<B> {
    /// Create a loader that yields samples in dataset order
    pub fn new(
        dataset: Arc<ClassificationDataset>,
        batch_size: usize,
        device: B::Device,
    ) -> Result<Self> {
        if batch_size == 0 {
            return Err(LabError::Configuration(
                "batch size must be at least 1".to_string(),
            ));
        }

        let mut loader = BatchLoader {
            dataset,
            batch_size,
            shuffle_seed: None,
            device,
            fixed: None,
        };
        loader.fixed = Some(loader.build(None));
        Ok(loader)
    }

    /// Shuffle sample order every epoch
    pub fn shuffle(mut self, seed: u64) -> Self {
        self.shuffle_seed = Some(seed);
        self.fixed = None;
        self
    }

    fn build(&self, shuffle: Option<u64>) -> Arc<dyn DataLoader<B, ClassBatch<B>>> {
        let builder = DataLoaderBuilder::new(ClassBatcher)
            .batch_size(self.batch_size)
            .set_device(self.device.clone());

        match shuffle {
            Some(seed) => builder.shuffle(seed).build(self.dataset.clone()),
            None => builder.build(self.dataset.clone()),
        }
    }
}

fn epoch_seed(seed: u64, epoch: usize) -> u64 {
    seed ^ (epoch as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl<B: Backend> BatchSource<B> for BatchLoader<B> {
    fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    fn loader(&self, epoch: usize) -> Arc<dyn DataLoader<B, ClassBatch<B>>> {
        match (&self.fixed, self.shuffle_seed) {
            (Some(fixed), _) => fixed.clone(),
            (None, seed) => self.build(seed.map(|s| epoch_seed(s, epoch))),
        }
    }
}
