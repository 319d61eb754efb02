//! Gradient update rules
//!
//! [`OptimizerKind`] is the recipe; [`OptimizerKind::init`] produces a fresh
//! [`UpdateRule`] with its own internal state every time it is called.

use std::fmt;

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::momentum::MomentumConfig;
use burn::optim::{
    Adam, AdamConfig, AdamW, AdamWConfig, GradientsParams, Optimizer, Sgd, SgdConfig,
};
use burn::tensor::backend::AutodiffBackend;

use crate::{LabError, Result};

/// Adam/AdamW numerical stability term
const ADAM_EPSILON: f32 = 1e-8;

/// Update rule and its fixed hyperparameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OptimizerKind {
    Sgd { lr: f64, momentum: Option<f64> },
    Adam { lr: f64 },
    AdamW { lr: f64, weight_decay: f64 },
}

impl OptimizerKind {
    pub fn sgd(lr: f64) -> Self {
        OptimizerKind::Sgd { lr, momentum: None }
    }

    pub fn sgd_momentum(lr: f64, momentum: f64) -> Self {
        OptimizerKind::Sgd {
            lr,
            momentum: Some(momentum),
        }
    }

    pub fn adam(lr: f64) -> Self {
        OptimizerKind::Adam { lr }
    }

    pub fn adamw(lr: f64, weight_decay: f64) -> Self {
        OptimizerKind::AdamW { lr, weight_decay }
    }

    /// Initial learning rate
    pub fn learning_rate(&self) -> f64 {
        match *self {
            OptimizerKind::Sgd { lr, .. } => lr,
            OptimizerKind::Adam { lr } => lr,
            OptimizerKind::AdamW { lr, .. } => lr,
        }
    }

    /// Build fresh optimizer state for a module of type `M`
    pub fn init<B: AutodiffBackend, M: AutodiffModule<B>>(&self) -> Result<UpdateRule<B, M>> {
        let lr = self.learning_rate();
        if !(lr.is_finite() && lr > 0.0) {
            return Err(LabError::Configuration(format!(
                "{} needs a positive learning rate",
                self
            )));
        }

        let rule = match *self {
            OptimizerKind::Sgd { momentum, .. } => {
                let momentum = match momentum {
                    Some(m) if !(0.0..1.0).contains(&m) => {
                        return Err(LabError::Configuration(format!(
                            "momentum must be in [0, 1), got {}",
                            m
                        )));
                    }
                    // Plain heavy-ball momentum, no dampening
                    Some(m) => Some(MomentumConfig::new().with_momentum(m).with_dampening(0.0)),
                    None => None,
                };
                UpdateRule::Sgd(SgdConfig::new().with_momentum(momentum).init())
            }
            OptimizerKind::Adam { .. } => {
                UpdateRule::Adam(AdamConfig::new().with_epsilon(ADAM_EPSILON).init())
            }
            OptimizerKind::AdamW { weight_decay, .. } => {
                if weight_decay < 0.0 {
                    return Err(LabError::Configuration(format!(
                        "weight decay must be non-negative, got {}",
                        weight_decay
                    )));
                }
                UpdateRule::AdamW(
                    AdamWConfig::new()
                        .with_epsilon(ADAM_EPSILON)
                        .with_weight_decay(weight_decay as f32)
                        .init(),
                )
            }
        };

        Ok(rule)
    }
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptimizerKind::Sgd { lr, momentum: None } => write!(f, "SGD(lr={})", lr),
            OptimizerKind::Sgd {
                lr,
                momentum: Some(m),
            } => write!(f, "SGD(lr={}, momentum={})", lr, m),
            OptimizerKind::Adam { lr } => write!(f, "Adam(lr={})", lr),
            OptimizerKind::AdamW { lr, weight_decay } => {
                write!(f, "AdamW(lr={}, weight_decay={})", lr, weight_decay)
            }
        }
    }
}

/// Optimizer state bound to one model
pub enum UpdateRule<B: AutodiffBackend, M: AutodiffModule<B>> {
    Sgd(OptimizerAdaptor<Sgd<B::InnerBackend>, M, B>),
    Adam(OptimizerAdaptor<Adam, M, B>),
    AdamW(OptimizerAdaptor<AdamW, M, B>),
}

impl<B: AutodiffBackend, M: AutodiffModule<B>> UpdateRule<B, M> {
    /// Apply one update at learning rate `lr`
    pub fn step(&mut self, lr: f64, module: M, grads: GradientsParams) -> M {
        match self {
            UpdateRule::Sgd(optim) => optim.step(lr, module, grads),
            UpdateRule::Adam(optim) => optim.step(lr, module, grads),
            UpdateRule::AdamW(optim) => optim.step(lr, module, grads),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::loss::CrossEntropyLossConfig;
    use burn::tensor::{ElementConversion, Int, Tensor, TensorData};

    use crate::model::{ClassifierConfig, MlpClassifier};

    type TestBackend = Autodiff<NdArray<f32>>;

    fn fixture() -> (MlpClassifier<TestBackend>, Tensor<TestBackend, 2>, Tensor<TestBackend, 1, Int>) {
        let device = Default::default();
        let config = ClassifierConfig {
            input_dim: 4,
            hidden_dim: 8,
            num_classes: 2,
        };
        let model = config.init(&device, 3);
        let images = Tensor::<TestBackend, 2>::from_floats(
            TensorData::new(
                vec![1.0f32, 0.0, 0.5, 0.0, 0.0, 1.0, 0.0, 0.5, 0.9, 0.1, 0.4, 0.0, 0.1, 0.9, 0.0, 0.6],
                [4, 4],
            ),
            &device,
        );
        let targets =
            Tensor::<TestBackend, 1, Int>::from_ints(TensorData::new(vec![0i64, 1, 0, 1], [4]), &device);
        (model, images, targets)
    }

    fn train(kind: OptimizerKind, steps: usize) -> (f32, f32) {
        let (mut model, images, targets) = fixture();
        let device = Default::default();
        let criterion = CrossEntropyLossConfig::new().init(&device);
        let mut optim = kind.init::<TestBackend, MlpClassifier<TestBackend>>().unwrap();

        let mut first = None;
        let mut last = 0.0;
        for _ in 0..steps {
            let loss = criterion.forward(model.forward(images.clone()), targets.clone());
            last = loss.clone().into_scalar().elem::<f32>();
            first.get_or_insert(last);
            let grads = GradientsParams::from_grads(loss.backward(), &model);
            model = optim.step(kind.learning_rate(), model, grads);
        }
        (first.unwrap_or(last), last)
    }

    #[test]
    fn test_every_rule_reduces_loss() {
        for kind in [
            OptimizerKind::sgd(0.5),
            OptimizerKind::sgd_momentum(0.1, 0.9),
            OptimizerKind::adam(0.01),
            OptimizerKind::adamw(0.01, 0.01),
        ] {
            let (first, last) = train(kind, 30);
            assert!(last < first, "{} did not reduce loss: {} -> {}", kind, first, last);
        }
    }

    #[test]
    fn test_fresh_state_per_init() {
        // A momentum optimizer that already stepped must not influence a new one
        let kind = OptimizerKind::sgd_momentum(0.1, 0.9);
        let _ = train(kind, 5);
        let (a_first, a_last) = train(kind, 3);
        let (b_first, b_last) = train(kind, 3);
        assert_eq!(a_first, b_first);
        assert_eq!(a_last, b_last);
    }

    #[test]
    fn test_invalid_hyperparameters() {
        type M = MlpClassifier<TestBackend>;
        assert!(OptimizerKind::sgd(0.0).init::<TestBackend, M>().is_err());
        assert!(OptimizerKind::sgd_momentum(0.1, 1.0).init::<TestBackend, M>().is_err());
        assert!(OptimizerKind::adamw(0.001, -1.0).init::<TestBackend, M>().is_err());
        assert!(OptimizerKind::adam(f64::NAN).init::<TestBackend, M>().is_err());
    }

    #[test]
    fn test_display_and_learning_rate() {
        assert_eq!(OptimizerKind::sgd(0.01).to_string(), "SGD(lr=0.01)");
        assert_eq!(
            OptimizerKind::sgd_momentum(0.01, 0.9).to_string(),
            "SGD(lr=0.01, momentum=0.9)"
        );
        assert_eq!(OptimizerKind::adamw(0.001, 0.01).learning_rate(), 0.001);
    }
}
