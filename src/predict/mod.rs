use crate::data::{BassetDataset, BatchLoader, Split};
use crate::error::MetricError;
use crate::metrics::{rank_auc, roc_auc};
use crate::model::architecture::BassetModel;
use crate::model::checkpoint::load_model;
use crate::model::loss::{criterion, Criterion};
use crate::model::{BassetConfig, Mode};
use crate::utils::{scalar_value, tensor_values};
use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Runs a trained network over whole dataset splits
pub struct Predictor<B: Backend> {
    model: BassetModel<B>,
    model_config: BassetConfig,
    criterion: Criterion,
    device: B::Device,
    batch_size: usize,
}

impl<B: Backend> Predictor<B> {
    pub fn new(model: BassetModel<B>, model_config: BassetConfig, device: B::Device) -> Self {
        Self {
            model,
            model_config,
            criterion: criterion(),
            device,
            batch_size: 128,
        }
    }

    /// Rebuild the network saved at `path` using its stored configuration
    pub fn from_checkpoint<P: AsRef<Path>>(path: P, device: B::Device) -> Result<Self> {
        let (model, metadata) = load_model::<B>(path.as_ref(), &device)?;
        info!(
            "Checkpoint from epoch {} (validation AUC {:.4})",
            metadata.epoch, metadata.valid.score
        );
        Ok(Self::new(model, metadata.model_config, device))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn model_config(&self) -> &BassetConfig {
        &self.model_config
    }

    /// Predict every sequence of `dataset` in inference mode
    pub fn predict_split(&self, dataset: &BassetDataset) -> Result<SplitPredictions> {
        if dataset.num_targets() != self.model_config.num_targets
            || dataset.sequence_length() != self.model_config.sequence_length
        {
            anyhow::bail!(
                "Dataset shape ({} positions, {} targets) does not match the model ({}, {})",
                dataset.sequence_length(),
                dataset.num_targets(),
                self.model_config.sequence_length,
                self.model_config.num_targets
            );
        }

        let loss_fn = self.criterion.init::<B>(&self.device);
        let loader = BatchLoader::new(dataset, self.batch_size);

        let mut probabilities = Vec::with_capacity(dataset.len() * dataset.num_targets());
        let mut targets = Vec::with_capacity(dataset.len() * dataset.num_targets());
        let mut loss_sum = 0.0;
        let mut batches = 0usize;

        for batch in loader.iter::<B>(&self.device) {
            let batch = batch.context("Failed to load batch")?;
            let logits = self.model.forward(batch.sequences, Mode::Inference);

            probabilities.extend(tensor_values(sigmoid(logits.clone()))?);
            loss_sum += scalar_value(loss_fn.forward(logits, batch.targets))?;
            targets.extend_from_slice(&batch.labels);
            batches += 1;
        }

        let ids = match dataset.ids() {
            Some(ids) => ids.to_vec(),
            None => (0..dataset.len()).map(|i| format!("{}_{}", dataset.split(), i)).collect(),
        };

        info!(
            "Predicted {} sequences of the {} split",
            dataset.len(),
            dataset.split()
        );

        Ok(SplitPredictions {
            split: dataset.split(),
            num_targets: dataset.num_targets(),
            probabilities,
            targets,
            ids,
            target_labels: dataset.target_labels().to_vec(),
            loss: if batches == 0 { 0.0 } else { loss_sum / batches as f64 },
        })
    }
}

/// Probabilities and labels for a whole split, row-major `[sequences, targets]`
#[derive(Debug, Clone)]
pub struct SplitPredictions {
    pub split: Split,
    pub num_targets: usize,
    pub probabilities: Vec<f32>,
    pub targets: Vec<u8>,
    /// One identifier per sequence
    pub ids: Vec<String>,
    /// One name per target column
    pub target_labels: Vec<String>,
    /// Mean batch loss
    pub loss: f64,
}

impl SplitPredictions {
    /// Number of sequences
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn probability(&self, row: usize, target: usize) -> Option<f32> {
        if target >= self.num_targets {
            return None;
        }
        self.probabilities.get(row * self.num_targets + target).copied()
    }

    /// Grid AUC over every (sequence, cell type) pair
    pub fn auc(&self) -> Result<f64, MetricError> {
        roc_auc(&self.targets, &self.probabilities)
    }

    /// Rank-based AUC over every (sequence, cell type) pair
    pub fn rank_auc(&self) -> Result<f64, MetricError> {
        rank_auc(&self.targets, &self.probabilities)
    }

    fn column(&self, target: usize) -> (Vec<u8>, Vec<f32>) {
        let labels = self
            .targets
            .iter()
            .skip(target)
            .step_by(self.num_targets)
            .copied()
            .collect();
        let scores = self
            .probabilities
            .iter()
            .skip(target)
            .step_by(self.num_targets)
            .copied()
            .collect();
        (labels, scores)
    }

    /// Grid AUC of each cell type; `None` where a column holds one class only
    pub fn per_target_auc(&self) -> Vec<TargetAuc> {
        (0..self.num_targets)
            .map(|target| {
                let (labels, scores) = self.column(target);
                TargetAuc {
                    label: self.target_labels[target].clone(),
                    auc: roc_auc(&labels, &scores).ok(),
                }
            })
            .collect()
    }

    /// Summary metrics for a JSON report
    pub fn report(&self) -> Result<EvaluationReport> {
        let per_target = self.per_target_auc();
        let defined: Vec<f64> = per_target.iter().filter_map(|t| t.auc).collect();
        if defined.len() < per_target.len() {
            warn!(
                "{} of {} cell types have a single class in the {} split",
                per_target.len() - defined.len(),
                per_target.len(),
                self.split
            );
        }
        let mean_target_auc = if defined.is_empty() {
            None
        } else {
            Some(defined.iter().sum::<f64>() / defined.len() as f64)
        };

        Ok(EvaluationReport {
            split: self.split.to_string(),
            sequences: self.len(),
            targets: self.num_targets,
            loss: self.loss,
            auc: self.auc().context("Pooled AUC is undefined")?,
            rank_auc: self.rank_auc().context("Pooled AUC is undefined")?,
            mean_target_auc,
            per_target,
        })
    }

    fn write_csv<W: Write>(&self, writer: W) -> Result<W> {
        let mut csv = csv::Writer::from_writer(writer);

        let mut header = Vec::with_capacity(self.num_targets + 1);
        header.push("id");
        header.extend(self.target_labels.iter().map(String::as_str));
        csv.write_record(&header)?;

        for (row, id) in self.ids.iter().enumerate() {
            let start = row * self.num_targets;
            let values = &self.probabilities[start..start + self.num_targets];
            let mut record = Vec::with_capacity(self.num_targets + 1);
            record.push(id.clone());
            record.extend(values.iter().map(|p| format!("{:.6}", p)));
            csv.write_record(&record)?;
        }

        csv.into_inner()
            .map_err(|e| anyhow!("Failed to flush predictions: {}", e.error()))
    }

    /// Write one row per sequence and one column per cell type; the file is
    /// gzip-compressed when `path` ends in `.gz`
    pub fn save_predictions_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let file = File::create(path)
            .with_context(|| format!("Failed to create predictions file {:?}", path))?;

        let gzipped = path.extension().map(|e| e == "gz").unwrap_or(false);
        if gzipped {
            let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            self.write_csv(encoder)?
                .finish()
                .context("Failed to finish gzip stream")?
                .flush()?;
        } else {
            self.write_csv(BufWriter::new(file))?.flush()?;
        }

        info!("Wrote {} predictions to {:?}", self.len(), path);
        Ok(())
    }
}

/// AUC of a single cell type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetAuc {
    pub label: String,
    pub auc: Option<f64>,
}

/// Evaluation metrics of one split
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: String,
    pub sequences: usize,
    pub targets: usize,
    /// Mean batch loss
    pub loss: f64,
    /// Pooled 20-threshold grid AUC
    pub auc: f64,
    /// Pooled rank-based AUC
    pub rank_auc: f64,
    /// Mean of the defined per-cell-type AUCs
    pub mean_target_auc: Option<f64>,
    pub per_target: Vec<TargetAuc>,
}

impl EvaluationReport {
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {:?}", path))?;
        info!("Wrote evaluation report to {:?}", path);
        Ok(())
    }
}
