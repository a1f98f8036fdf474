//! # Basset: chromatin accessibility from DNA sequence
//!
//! A convolutional network that predicts, for every 600 bp DNA window, whether
//! the region is accessible in each of 164 cell types.
//!
//! ## Features
//!
//! - Memory-mapped dataset access with half-float sequence storage
//! - The Basset architecture with a validated, configurable geometry
//! - Coarse-grid and rank-based ROC/AUC estimators
//! - Training and validation epoch drivers, checkpointing and early stopping
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use basset::data::{BassetDataset, BatchLoader, Split};
//! use basset::model::{architecture::init_model, loss::criterion, BassetConfig};
//! use basset::training::{validate_epoch, TrainingConfig, trainer::Trainer};
//! use basset::{DefaultBackend, TrainingBackend};
//!
//! let train = BassetDataset::open("er.safetensors", Split::Train).unwrap();
//! let valid = BassetDataset::open("er.safetensors", Split::Valid).unwrap();
//!
//! let device = burn::backend::ndarray::NdArrayDevice::default();
//! let mut trainer = Trainer::<TrainingBackend>::new(
//!     TrainingConfig::default(),
//!     BassetConfig::basset_default(),
//!     device.clone(),
//! );
//! let (_model, result) = trainer.fit(&train, &valid).unwrap();
//! println!("best validation AUC {:.4}", result.state.best_metric);
//!
//! // score an untrained network for comparison
//! let untrained = init_model::<DefaultBackend>(&BassetConfig::basset_default(), &device).unwrap();
//! let loader = BatchLoader::new(&valid, 64);
//! let baseline = validate_epoch(&untrained, &loader, &device, criterion()).unwrap();
//! println!("untrained validation AUC {:.4}", baseline.score);
//! ```

pub mod cli;
pub mod data;
pub mod error;
pub mod metrics;
pub mod model;
pub mod predict;
pub mod training;
pub mod utils;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

pub use data::{BassetDataset, BatchLoader, Split};
pub use error::{ConfigError, DataError, MetricError};
pub use metrics::{confusion_rates, rank_auc, roc_auc};
pub use model::{architecture::BassetModel, BassetConfig, Mode};
pub use predict::{Predictor, SplitPredictions};
pub use training::{train_epoch, validate_epoch, EpochOutcome, TrainingConfig, TrainingResult};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - chromatin accessibility prediction from DNA sequence",
        NAME, VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("basset"));
        assert!(info_str.contains(VERSION));
    }
}
