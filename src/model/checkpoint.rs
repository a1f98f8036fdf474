use crate::model::architecture::{init_model, BassetModel};
use crate::model::BassetConfig;
use crate::training::{EpochOutcome, TrainingConfig};
use anyhow::{Context, Result};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

const BEST_MODEL: &str = "best_model.mpk";
const EPOCH_PREFIX: &str = "checkpoint_epoch_";

/// Sidecar JSON written next to every set of weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// Crate version that wrote the checkpoint
    pub version: String,
    /// Epochs completed
    pub epoch: usize,
    /// Optimizer steps taken
    pub step: usize,
    pub train: EpochOutcome,
    pub valid: EpochOutcome,
    /// Architecture needed to rebuild the network before loading weights
    pub model_config: BassetConfig,
    pub training_config: TrainingConfig,
    /// Seconds since the Unix epoch
    pub saved_at: u64,
}

impl CheckpointMetadata {
    pub fn new(
        epoch: usize,
        step: usize,
        train: EpochOutcome,
        valid: EpochOutcome,
        model_config: &BassetConfig,
        training_config: &TrainingConfig,
    ) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            epoch,
            step,
            train,
            valid,
            model_config: model_config.clone(),
            training_config: training_config.clone(),
            saved_at: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
        }
    }
}

/// Checkpoint manager for saving and loading model checkpoints
pub struct CheckpointManager {
    checkpoint_dir: PathBuf,
    /// Per-epoch checkpoints kept on disk
    max_checkpoints: usize,
    /// Best validation AUC saved so far
    best_metric: Option<f64>,
}

impl CheckpointManager {
    pub fn new<P: AsRef<Path>>(checkpoint_dir: P) -> Result<Self> {
        let checkpoint_dir = checkpoint_dir.as_ref().to_path_buf();
        crate::utils::ensure_dir(&checkpoint_dir)?;

        Ok(Self {
            checkpoint_dir,
            max_checkpoints: 3,
            best_metric: None,
        })
    }

    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints = max;
        self
    }

    /// Save the weights of epoch `metadata.epoch`, pruning the oldest
    pub fn save_checkpoint<B: Backend>(
        &mut self,
        model: &BassetModel<B>,
        metadata: &CheckpointMetadata,
    ) -> Result<PathBuf> {
        let path = self
            .checkpoint_dir
            .join(format!("{}{}.mpk", EPOCH_PREFIX, metadata.epoch));
        save_model(model, &path, metadata)?;
        self.cleanup_old_checkpoints()?;
        Ok(path)
    }

    /// Save as the best model if `metric` beats every earlier call
    pub fn save_best<B: Backend>(
        &mut self,
        model: &BassetModel<B>,
        metadata: &CheckpointMetadata,
        metric: f64,
    ) -> Result<Option<PathBuf>> {
        let is_best = match self.best_metric {
            None => true,
            Some(best) => metric > best,
        };

        if !is_best {
            debug!(
                "Validation AUC {:.4} did not beat {:?}",
                metric, self.best_metric
            );
            return Ok(None);
        }

        info!(
            "New best validation AUC: {:.4} (previous: {:?})",
            metric, self.best_metric
        );
        self.best_metric = Some(metric);

        let path = self.best_path();
        save_model(model, &path, metadata)?;
        Ok(Some(path))
    }

    pub fn best_path(&self) -> PathBuf {
        self.checkpoint_dir.join(BEST_MODEL)
    }

    pub fn load_best<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(BassetModel<B>, CheckpointMetadata)> {
        let path = self.best_path();
        if !path.exists() {
            anyhow::bail!("No best model found at {:?}", path);
        }
        load_model(&path, device)
    }

    pub fn load_latest<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Result<(BassetModel<B>, CheckpointMetadata)> {
        let latest = self
            .list_checkpoints()?
            .into_iter()
            .max_by_key(|(epoch, _)| *epoch)
            .map(|(_, path)| path);

        match latest {
            Some(path) => load_model(&path, device),
            None => anyhow::bail!("No checkpoints found in {:?}", self.checkpoint_dir),
        }
    }

    /// Per-epoch checkpoints as `(epoch, path)`, unordered
    pub fn list_checkpoints(&self) -> Result<Vec<(usize, PathBuf)>> {
        let mut checkpoints = Vec::new();

        for entry in fs::read_dir(&self.checkpoint_dir)
            .context("Failed to read checkpoint directory")?
        {
            let path = entry.context("Failed to read directory entry")?.path();
            if path.extension().map(|e| e != "mpk").unwrap_or(true) {
                continue;
            }

            let epoch = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|stem| stem.strip_prefix(EPOCH_PREFIX))
                .and_then(|epoch| epoch.parse::<usize>().ok());
            if let Some(epoch) = epoch {
                checkpoints.push((epoch, path));
            }
        }

        Ok(checkpoints)
    }

    fn cleanup_old_checkpoints(&self) -> Result<()> {
        let mut checkpoints = self.list_checkpoints()?;
        if checkpoints.len() <= self.max_checkpoints {
            return Ok(());
        }

        checkpoints.sort_by_key(|(epoch, _)| *epoch);
        let to_remove = checkpoints.len() - self.max_checkpoints;
        for (_, path) in checkpoints.into_iter().take(to_remove) {
            debug!("Removing old checkpoint: {:?}", path);
            fs::remove_file(&path).ok();
            fs::remove_file(path.with_extension("json")).ok();
        }
        Ok(())
    }

    pub fn checkpoint_dir(&self) -> &Path {
        &self.checkpoint_dir
    }
}

/// Write weights to `path` and metadata to the `.json` next to it
pub fn save_model<B: Backend>(
    model: &BassetModel<B>,
    path: &Path,
    metadata: &CheckpointMetadata,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        crate::utils::ensure_dir(parent)?;
    }

    CompactRecorder::new()
        .record(model.clone().into_record(), path.to_path_buf())
        .context("Failed to save model weights")?;

    let metadata_json =
        serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
    fs::write(path.with_extension("json"), metadata_json)
        .context("Failed to write metadata file")?;

    info!("Saved checkpoint: {:?}", path);
    Ok(())
}

/// Rebuild the network from the saved configuration and load its weights
pub fn load_model<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(BassetModel<B>, CheckpointMetadata)> {
    info!("Loading checkpoint from {:?}", path);

    let metadata_path = path.with_extension("json");
    let metadata_json = fs::read_to_string(&metadata_path)
        .with_context(|| format!("Failed to read metadata file {:?}", metadata_path))?;
    let metadata: CheckpointMetadata =
        serde_json::from_str(&metadata_json).context("Failed to parse metadata")?;

    let record = CompactRecorder::new()
        .load(path.to_path_buf(), device)
        .context("Failed to load model weights")?;
    let model = init_model::<B>(&metadata.model_config, device)
        .context("Checkpoint holds an invalid model configuration")?
        .load_record(record);

    info!("Loaded checkpoint from epoch {}", metadata.epoch);
    Ok((model, metadata))
}
