//! Fully-connected classifier
//!
//! Architecture: Input(784) → Hidden(256) → ReLU → Output(10)

use std::sync::{Mutex, PoisonError};

use burn::module::Module;
use burn::nn::{Initializer, Linear, LinearConfig};
use burn::tensor::activation::relu;
use burn::tensor::backend::{AutodiffBackend, Backend};
use burn::tensor::{ElementConversion, Tensor};

use crate::ModelConfig;

/// Configuration for the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassifierConfig {
    pub input_dim: usize,
    pub hidden_dim: usize,
    pub num_classes: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for ClassifierConfig {
    fn from(config: &ModelConfig) -> Self {
        ClassifierConfig {
            input_dim: config.input_dim,
            hidden_dim: config.hidden_dim,
            num_classes: config.num_classes,
        }
    }
}

impl ClassifierConfig {
    /// Build a freshly initialized classifier.
    ///
    /// The same seed always yields the same weights, so every configuration
    /// of an experiment starts from an identical model.
    pub fn init<B: Backend>(&self, device: &B::Device, seed: u64) -> MlpClassifier<B> {
        // The backend RNG is process-wide; hold it for the whole draw
        let _guard = INIT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        B::seed(seed);
        MlpClassifier {
            hidden: uniform_linear(self.input_dim, self.hidden_dim, device),
            output: uniform_linear(self.hidden_dim, self.num_classes, device),
        }
    }
}

/// Two-layer perceptron producing raw class scores
#[derive(Module, Debug)]
pub struct MlpClassifier<B: Backend> {
    hidden: Linear<B>,
    output: Linear<B>,
}

impl<B: Backend> MlpClassifier<B> {
    /// Forward pass
    ///
    /// # Arguments
    /// * `images` - Flattened inputs [batch, input_dim]
    ///
    /// # Returns
    /// Class scores [batch, num_classes]
    pub fn forward(&self, images: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = relu(self.hidden.forward(images));
        self.output.forward(x)
    }
}

impl<B: AutodiffBackend> MlpClassifier<B> {
    /// Sum of absolute gradient entries over every parameter.
    ///
    /// Non-finite as soon as any single entry is.
    pub fn gradient_l1(&self, grads: &B::Gradients) -> f64 {
        [&self.hidden, &self.output]
            .iter()
            .map(|layer| {
                let weight = layer.weight.val().grad(grads).map_or(0.0, l1);
                let bias = layer
                    .bias
                    .as_ref()
                    .and_then(|b| b.val().grad(grads))
                    .map_or(0.0, l1);
                weight + bias
            })
            .sum()
    }
}

fn l1<B: Backend, const D: usize>(tensor: Tensor<B, D>) -> f64 {
    tensor.abs().sum().into_scalar().elem::<f64>()
}

static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Linear layer with weights and bias drawn from U(-1/√fan_in, 1/√fan_in)
fn uniform_linear<B: Backend>(fan_in: usize, fan_out: usize, device: &B::Device) -> Linear<B> {
    let bound = 1.0 / (fan_in as f64).sqrt();
    let layer = LinearConfig::new(fan_in, fan_out)
        .with_initializer(Initializer::Uniform {
            min: -bound,
            max: bound,
        })
        .init(device);

    // Parameters initialize lazily; draw them now, in a fixed order
    let _ = layer.weight.val();
    if let Some(bias) = &layer.bias {
        let _ = bias.val();
    }
    layer
}
