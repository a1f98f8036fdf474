pub mod accumulator;
pub mod epoch;
pub mod trainer;

pub use accumulator::PeriodicAuc;
pub use epoch::{train_epoch, validate_epoch};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Training configuration
///
/// Missing fields in a JSON file fall back to the defaults, so a config
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// L2 penalty applied by Adam (0 = disabled)
    pub weight_decay: f64,
    /// Epochs without validation improvement before stopping (0 = disabled)
    pub early_stopping_patience: usize,
    /// Random seed for initialization and shuffling
    pub seed: u64,
    /// Whether to reshuffle the training split every epoch
    pub shuffle: bool,
    /// Batches pooled into one training AUC sample
    pub auc_window: usize,
    /// Batches between running loss/score log lines (0 = disabled)
    pub log_every: usize,
    /// Per-epoch checkpoints kept on disk
    pub max_checkpoints: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 64,
            learning_rate: 0.001,
            weight_decay: 0.0,
            early_stopping_patience: 3,
            seed: 2026,
            shuffle: true,
            auc_window: 50,
            log_every: 500,
            max_checkpoints: 3,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            epochs: 2,
            batch_size: 4,
            learning_rate: 0.01,
            auc_window: 2,
            log_every: 0,
            ..Default::default()
        }
    }

    /// Read a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read training config {:?}", path))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse training config {:?}", path))
    }
}

/// Summary of one pass over a split
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct EpochOutcome {
    /// Training: sum of the periodic AUC samples. Validation: mean batch AUC.
    pub score: f64,
    /// Training: sum of batch losses. Validation: mean batch loss.
    pub loss: f64,
    /// Batches processed
    pub batches: usize,
}

/// Training state
#[derive(Debug, Clone)]
pub struct TrainingState {
    /// Epochs completed
    pub epoch: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    /// Best validation AUC so far
    pub best_metric: f64,
    /// Epoch that reached `best_metric`
    pub best_epoch: Option<usize>,
    /// Number of epochs without improvement
    pub epochs_without_improvement: usize,
    pub train_loss_history: Vec<f64>,
    pub train_score_history: Vec<f64>,
    pub val_loss_history: Vec<f64>,
    pub val_auc_history: Vec<f64>,
}

impl TrainingState {
    pub fn new() -> Self {
        Self {
            epoch: 0,
            global_step: 0,
            best_metric: f64::NEG_INFINITY,
            best_epoch: None,
            epochs_without_improvement: 0,
            train_loss_history: Vec::new(),
            train_score_history: Vec::new(),
            val_loss_history: Vec::new(),
            val_auc_history: Vec::new(),
        }
    }

    /// Record a finished epoch; returns whether validation AUC improved
    pub fn update_epoch(&mut self, train: &EpochOutcome, valid: &EpochOutcome) -> bool {
        self.epoch += 1;
        self.global_step += train.batches;
        self.train_loss_history.push(train.loss);
        self.train_score_history.push(train.score);
        self.val_loss_history.push(valid.loss);
        self.val_auc_history.push(valid.score);

        if valid.score > self.best_metric {
            self.best_metric = valid.score;
            self.best_epoch = Some(self.epoch);
            self.epochs_without_improvement = 0;
            true
        } else {
            self.epochs_without_improvement += 1;
            false
        }
    }

    /// Check if should stop early
    pub fn should_stop_early(&self, patience: usize) -> bool {
        patience > 0 && self.epochs_without_improvement >= patience
    }
}

impl Default for TrainingState {
    fn default() -> Self {
        Self::new()
    }
}

/// Training result
#[derive(Debug, Clone)]
pub struct TrainingResult {
    /// Final training state
    pub state: TrainingState,
    /// Path to best model checkpoint
    pub best_checkpoint: Option<PathBuf>,
    /// Training duration in seconds
    pub duration_secs: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn outcome(score: f64) -> EpochOutcome {
        EpochOutcome {
            score,
            loss: 1.0,
            batches: 10,
        }
    }

    #[test]
    fn test_state_tracks_best_and_patience() {
        let mut state = TrainingState::new();

        assert!(state.update_epoch(&outcome(3.0), &outcome(0.6)));
        assert!(state.update_epoch(&outcome(3.0), &outcome(0.7)));
        assert!(!state.update_epoch(&outcome(3.0), &outcome(0.65)));
        assert!(!state.update_epoch(&outcome(3.0), &outcome(0.7)));

        assert_eq!(state.epoch, 4);
        assert_eq!(state.global_step, 40);
        assert_eq!(state.best_metric, 0.7);
        assert_eq!(state.best_epoch, Some(2));
        assert_eq!(state.epochs_without_improvement, 2);
        assert!(state.should_stop_early(2));
        assert!(!state.should_stop_early(3));
        assert!(!state.should_stop_early(0));
    }

    #[test]
    fn test_config_from_partial_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("train.json");
        std::fs::write(&path, r#"{"epochs": 4, "learning_rate": 0.01}"#).unwrap();

        let config = TrainingConfig::from_json_file(&path).unwrap();
        assert_eq!(config.epochs, 4);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.auc_window, 50);
        assert_eq!(config.log_every, 500);
    }

    #[test]
    fn test_config_missing_file() {
        assert!(TrainingConfig::from_json_file("/nonexistent/train.json").is_err());
    }
}
