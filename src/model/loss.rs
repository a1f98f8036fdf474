use burn::nn::loss::{BinaryCrossEntropyLoss, BinaryCrossEntropyLossConfig};
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Training objective
///
/// Every cell type is an independent binary target, so the only objective
/// is binary cross-entropy on logits averaged over all cells of the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Criterion {
    #[default]
    BceWithLogits,
}

impl Criterion {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Loss<B> {
        match self {
            Criterion::BceWithLogits => Loss {
                bce: BinaryCrossEntropyLossConfig::new()
                    .with_logits(true)
                    .init(device),
            },
        }
    }
}

/// The objective used for every training run
pub fn criterion() -> Criterion {
    Criterion::default()
}

/// Initialized objective bound to a device
#[derive(Debug, Clone)]
pub struct Loss<B: Backend> {
    bce: BinaryCrossEntropyLoss<B>,
}

impl<B: Backend> Loss<B> {
    /// Mean loss over `[N, T]` logits and `{0, 1}` targets
    pub fn forward(&self, logits: Tensor<B, 2>, targets: Tensor<B, 2, Int>) -> Tensor<B, 1> {
        self.bce.forward(logits, targets)
    }
}
