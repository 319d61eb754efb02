//! Burn Dataset implementation for image classification samples
//!
//! Provides flattened, normalized feature vectors with integer class labels,
//! either from MNIST or from a seeded synthetic generator.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::vision::MnistDataset;
use burn::data::dataset::Dataset;
use burn::tensor::backend::Backend;
use burn::tensor::{Int, Tensor, TensorData};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

use crate::{LabError, Result};

/// Pixel normalization parameters
#[derive(Debug, Clone, Copy)]
pub struct PixelNormalization {
    pub mean: f32,
    pub std: f32,
}

impl Default for PixelNormalization {
    fn default() -> Self {
        // MNIST training-set statistics
        PixelNormalization {
            mean: 0.1307,
            std: 0.3081,
        }
    }
}

impl PixelNormalization {
    /// Scale a raw 0..255 pixel to [0, 1] and apply z-score normalization
    pub fn apply(&self, raw: f32) -> f32 {
        (raw / 255.0 - self.mean) / self.std
    }
}

/// A single classification sample
#[derive(Debug, Clone, PartialEq)]
pub struct ClassSample {
    /// Flattened, normalized features
    pub features: Vec<f32>,
    pub label: usize,
}

/// In-memory classification dataset
#[derive(Debug, Clone, Default)]
pub struct ClassificationDataset {
    samples: Vec<ClassSample>,
    input_dim: usize,
    num_classes: usize,
}

impl ClassificationDataset {
    /// Side length of an MNIST image
    pub const MNIST_SIDE: usize = 28;

    /// Create a dataset from pre-computed samples, checking their shape
    pub fn from_samples(
        samples: Vec<ClassSample>,
        input_dim: usize,
        num_classes: usize,
    ) -> Result<Self> {
        if let Some((i, s)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.features.len() != input_dim)
        {
            return Err(LabError::Dataset(format!(
                "sample {} has {} features, expected {}",
                i,
                s.features.len(),
                input_dim
            )));
        }
        if let Some((i, s)) = samples
            .iter()
            .enumerate()
            .find(|(_, s)| s.label >= num_classes)
        {
            return Err(LabError::Dataset(format!(
                "sample {} has label {}, expected < {}",
                i, s.label, num_classes
            )));
        }

        Ok(ClassificationDataset {
            samples,
            input_dim,
            num_classes,
        })
    }

    /// MNIST training split (downloaded and cached by burn on first use)
    pub fn mnist_train() -> Result<Self> {
        Self::from_mnist(&MnistDataset::train(), PixelNormalization::default())
    }

    /// MNIST test split
    pub fn mnist_test() -> Result<Self> {
        Self::from_mnist(&MnistDataset::test(), PixelNormalization::default())
    }

    fn from_mnist(dataset: &MnistDataset, norm: PixelNormalization) -> Result<Self> {
        let side = Self::MNIST_SIDE;
        let samples = (0..dataset.len())
            .filter_map(|i| dataset.get(i))
            .map(|item| ClassSample {
                features: item
                    .image
                    .iter()
                    .flat_map(|row| row.iter().map(|&p| norm.apply(p)))
                    .collect(),
                label: item.label as usize,
            })
            .collect::<Vec<_>>();

        log::debug!("Loaded {} MNIST samples", samples.len());
        Self::from_samples(samples, side * side, 10)
    }

    /// Generate a train/test pair of Gaussian clusters, one per class.
    ///
    /// Both splits share the cluster centers; sample noise is drawn from
    /// independent streams so the test split is never a copy of training.
    pub fn synthetic_pair(
        train_samples: usize,
        test_samples: usize,
        input_dim: usize,
        num_classes: usize,
        seed: u64,
    ) -> Result<(Self, Self)> {
        if num_classes == 0 || input_dim == 0 {
            return Err(LabError::Dataset(
                "synthetic data needs at least one class and one feature".to_string(),
            ));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let centers: Vec<Vec<f32>> = (0..num_classes)
            .map(|_| {
                (0..input_dim)
                    .map(|_| rng.sample::<f32, _>(StandardNormal))
                    .collect()
            })
            .collect();

        let generate = |n: usize, stream: u64| {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(stream));
            (0..n)
                .map(|i| {
                    let label = i % num_classes;
                    let features = centers[label]
                        .iter()
                        .map(|c| c + rng.sample::<f32, _>(StandardNormal))
                        .collect();
                    ClassSample { features, label }
                })
                .collect::<Vec<_>>()
        };

        Ok((
            Self::from_samples(generate(train_samples, 1), input_dim, num_classes)?,
            Self::from_samples(generate(test_samples, 2), input_dim, num_classes)?,
        ))
    }

    /// Get the number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if dataset is empty
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}

impl Dataset<ClassSample> for ClassificationDataset {
    fn get(&self, index: usize) -> Option<ClassSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

/// Batch of samples for training or evaluation
#[derive(Debug, Clone)]
pub struct ClassBatch<B: Backend> {
    /// Features: [batch, input_dim]
    pub images: Tensor<B, 2>,
    /// Class labels: [batch]
    pub targets: Tensor<B, 1, Int>,
}

impl<B: Backend> ClassBatch<B> {
    pub fn size(&self) -> usize {
        self.targets.dims()[0]
    }
}

/// Batcher stacking samples into tensors
#[derive(Debug, Clone, Default)]
pub struct ClassBatcher;

impl<B: Backend> Batcher<B, ClassSample, ClassBatch<B>> for ClassBatcher {
    fn batch(&self, items: Vec<ClassSample>, device: &B::Device) -> ClassBatch<B> {
        let batch_size = items.len();
        let input_dim = items.first().map(|s| s.features.len()).unwrap_or(0);

        let mut features = Vec::with_capacity(batch_size * input_dim);
        let mut labels = Vec::with_capacity(batch_size);
        for sample in items {
            features.extend(sample.features);
            labels.push(sample.label as i64);
        }

        let images =
            Tensor::<B, 2>::from_floats(TensorData::new(features, [batch_size, input_dim]), device);
        let targets =
            Tensor::<B, 1, Int>::from_ints(TensorData::new(labels, [batch_size]), device);

        ClassBatch { images, targets }
    }
}
