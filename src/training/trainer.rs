use crate::data::{BassetDataset, BatchLoader};
use crate::model::architecture::{init_model, BassetModel};
use crate::model::checkpoint::{CheckpointManager, CheckpointMetadata};
use crate::model::loss::{criterion, Criterion};
use crate::model::BassetConfig;
use crate::training::{train_epoch, validate_epoch, TrainingConfig, TrainingResult, TrainingState};
use crate::utils::format_duration;
use anyhow::{Context, Result};
use burn::module::AutodiffModule;
use burn::optim::decay::WeightDecayConfig;
use burn::optim::AdamConfig;
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Trainer for the Basset network
pub struct Trainer<B: AutodiffBackend> {
    config: TrainingConfig,
    model_config: BassetConfig,
    criterion: Criterion,
    device: B::Device,
    checkpoint_manager: Option<CheckpointManager>,
    show_progress: bool,
}

impl<B: AutodiffBackend> Trainer<B> {
    pub fn new(config: TrainingConfig, model_config: BassetConfig, device: B::Device) -> Self {
        Self {
            config,
            model_config,
            criterion: criterion(),
            device,
            checkpoint_manager: None,
            show_progress: true,
        }
    }

    /// Save per-epoch and best checkpoints under `checkpoint_dir`
    pub fn with_checkpoint_dir<P: AsRef<Path>>(mut self, checkpoint_dir: P) -> Result<Self> {
        let manager = CheckpointManager::new(checkpoint_dir)?
            .with_max_checkpoints(self.config.max_checkpoints);
        self.checkpoint_manager = Some(manager);
        Ok(self)
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    fn progress_bar(&self) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(self.config.epochs as u64);
        let style = ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} epochs {msg}",
        );
        if let Ok(style) = style {
            bar.set_style(style);
        }
        bar
    }

    /// Train on `train`, selecting the epoch with the best validation AUC
    ///
    /// Returns the model as it stands after the last epoch; the best one is
    /// on disk when a checkpoint directory is configured.
    pub fn fit(
        &mut self,
        train: &BassetDataset,
        valid: &BassetDataset,
    ) -> Result<(BassetModel<B>, TrainingResult)> {
        info!("Starting training with configuration: {:?}", self.config);
        info!(
            "{} training and {} validation sequences",
            train.len(),
            valid.len()
        );

        let start_time = Instant::now();
        let mut state = TrainingState::new();
        let mut best_checkpoint = None;

        B::seed(self.config.seed);
        let mut model = init_model::<B>(&self.model_config, &self.device)
            .context("Invalid model configuration")?;

        let mut adam = AdamConfig::new();
        if self.config.weight_decay > 0.0 {
            adam = adam.with_weight_decay(Some(WeightDecayConfig::new(self.config.weight_decay as f32)));
        }
        let mut optimizer = adam.init();

        let valid_loader = BatchLoader::new(valid, self.config.batch_size);
        let progress = self.progress_bar();

        for epoch in 1..=self.config.epochs {
            let train_loader = if self.config.shuffle {
                let seed = self.config.seed + epoch as u64;
                BatchLoader::shuffled(train, self.config.batch_size, seed)
            } else {
                BatchLoader::new(train, self.config.batch_size)
            };

            let (trained, train_outcome) = train_epoch(
                model,
                &train_loader,
                &self.device,
                &mut optimizer,
                self.criterion,
                &self.config,
            )
            .with_context(|| format!("Training failed in epoch {}", epoch))?;
            model = trained;

            let valid_outcome =
                validate_epoch(&model.valid(), &valid_loader, &self.device, self.criterion)
                    .with_context(|| format!("Validation failed in epoch {}", epoch))?;

            let improved = state.update_epoch(&train_outcome, &valid_outcome);
            info!(
                "Epoch {}/{}: train loss {:.4}, train score {:.4}, valid loss {:.4}, valid AUC {:.4}",
                epoch,
                self.config.epochs,
                train_outcome.loss,
                train_outcome.score,
                valid_outcome.loss,
                valid_outcome.score
            );
            progress.set_message(format!("valid AUC {:.4}", valid_outcome.score));
            progress.inc(1);

            if let Some(manager) = self.checkpoint_manager.as_mut() {
                let metadata = CheckpointMetadata::new(
                    epoch,
                    state.global_step,
                    train_outcome,
                    valid_outcome,
                    &self.model_config,
                    &self.config,
                );
                manager.save_checkpoint(&model, &metadata)?;
                if improved {
                    if let Some(path) = manager.save_best(&model, &metadata, valid_outcome.score)? {
                        best_checkpoint = Some(path);
                    }
                }
            }

            if state.should_stop_early(self.config.early_stopping_patience) {
                warn!(
                    "Early stopping after epoch {}: no improvement for {} epochs",
                    epoch, state.epochs_without_improvement
                );
                break;
            }
        }

        progress.finish_and_clear();
        let duration_secs = start_time.elapsed().as_secs_f64();
        info!(
            "Training finished in {}; best validation AUC {:.4} at epoch {:?}",
            format_duration(duration_secs),
            state.best_metric,
            state.best_epoch
        );

        Ok((
            model,
            TrainingResult {
                state,
                best_checkpoint,
                duration_secs,
            },
        ))
    }
}

/// Open the train and valid splits of `data` and fit a fresh network
pub fn train_model<B: AutodiffBackend>(
    data: &Path,
    model_config: BassetConfig,
    training_config: TrainingConfig,
    checkpoint_dir: Option<&Path>,
) -> Result<TrainingResult> {
    let shape = model_config.dataset_shape();
    let train = BassetDataset::with_shape(data, crate::data::Split::Train, shape)
        .with_context(|| format!("Failed to open training split of {:?}", data))?;
    let valid = BassetDataset::with_shape(data, crate::data::Split::Valid, shape)
        .with_context(|| format!("Failed to open validation split of {:?}", data))?;

    let mut trainer = Trainer::<B>::new(training_config, model_config, B::Device::default());
    if let Some(dir) = checkpoint_dir {
        trainer = trainer.with_checkpoint_dir(dir)?;
    }

    let (_, result) = trainer.fit(&train, &valid)?;
    Ok(result)
}
