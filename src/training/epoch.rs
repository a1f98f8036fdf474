use crate::data::BatchLoader;
use crate::metrics::roc_auc;
use crate::model::architecture::BassetModel;
use crate::model::loss::Criterion;
use crate::model::Mode;
use crate::training::{EpochOutcome, PeriodicAuc, TrainingConfig};
use crate::utils::{scalar_value, tensor_values};
use anyhow::{Context, Result};
use burn::optim::{GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::activation::sigmoid;
use burn::tensor::backend::AutodiffBackend;
use tracing::{debug, info, warn};

/// One optimization pass over the training split
///
/// Takes one optimizer step per batch. Sigmoid outputs are pooled into
/// windows of `config.auc_window` batches and each full window adds one AUC
/// sample to `score`; a trailing partial window is discarded. `loss` is the
/// sum of the batch losses.
pub fn train_epoch<B, O>(
    mut model: BassetModel<B>,
    loader: &BatchLoader<'_>,
    device: &B::Device,
    optimizer: &mut O,
    criterion: Criterion,
    config: &TrainingConfig,
) -> Result<(BassetModel<B>, EpochOutcome)>
where
    B: AutodiffBackend,
    O: Optimizer<BassetModel<B>, B>,
{
    let loss_fn = criterion.init::<B>(device);
    let mut window = PeriodicAuc::new(config.auc_window);
    let mut outcome = EpochOutcome::default();

    // running values since the last log line
    let mut recent_loss = 0.0;
    let mut recent_score = 0.0;
    let mut recent_windows = 0usize;

    for batch in loader.iter::<B>(device) {
        let batch = batch.context("Failed to load training batch")?;

        let logits = model.forward(batch.sequences, Mode::Train);
        let probabilities = tensor_values(sigmoid(logits.clone().detach()))?;
        let loss = loss_fn.forward(logits, batch.targets);
        let loss_value = scalar_value(loss.clone())?;

        let grads = GradientsParams::from_grads(loss.backward(), &model);
        model = optimizer.step(config.learning_rate, model, grads);

        outcome.loss += loss_value;
        outcome.batches += 1;
        recent_loss += loss_value;

        window.observe(&probabilities, &batch.labels);
        if let Some(auc) = window
            .flush()
            .with_context(|| format!("AUC undefined at training batch {}", outcome.batches))?
        {
            debug!("Training window AUC {:.4} at batch {}", auc, outcome.batches);
            outcome.score += auc;
            recent_score += auc;
            recent_windows += 1;
        }

        if report_due(outcome.batches, config.log_every, recent_windows) {
            info!(
                "Batch {}/{}: loss {:.4}, score {:.4} over {} windows",
                outcome.batches,
                loader.num_batches(),
                recent_loss,
                recent_score,
                recent_windows
            );
            recent_loss = 0.0;
            recent_score = 0.0;
            recent_windows = 0;
        }
    }

    if outcome.batches == 0 {
        warn!("Training split produced no batches");
    } else if window.pending() > 0 {
        debug!("Dropping {} batches of an incomplete AUC window", window.pending());
    }

    Ok((model, outcome))
}

/// A progress line is due every `log_every` batches, once at least one AUC
/// window has completed since the last one
fn report_due(batches: usize, log_every: usize, windows: usize) -> bool {
    log_every > 0 && batches % log_every == 0 && windows > 0
}

/// One pass over the validation split without updating the model
///
/// Runs in inference mode. AUC and loss are computed per batch and averaged
/// over the batches; an empty split yields zeros.
pub fn validate_epoch<B: Backend>(
    model: &BassetModel<B>,
    loader: &BatchLoader<'_>,
    device: &B::Device,
    criterion: Criterion,
) -> Result<EpochOutcome> {
    let loss_fn = criterion.init::<B>(device);
    let mut outcome = EpochOutcome::default();

    for batch in loader.iter::<B>(device) {
        let batch = batch.context("Failed to load validation batch")?;

        let logits = model.forward(batch.sequences, Mode::Inference);
        let probabilities = tensor_values(sigmoid(logits.clone()))?;
        let loss = scalar_value(loss_fn.forward(logits, batch.targets))?;

        let auc = roc_auc(&batch.labels, &probabilities).with_context(|| {
            format!("AUC undefined at validation batch {}", outcome.batches + 1)
        })?;

        outcome.loss += loss;
        outcome.score += auc;
        outcome.batches += 1;
    }

    if outcome.batches == 0 {
        warn!("Validation split produced no batches");
        return Ok(outcome);
    }

    let batches = outcome.batches as f64;
    outcome.loss /= batches;
    outcome.score /= batches;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::fixtures::write_dataset;
    use crate::data::{BassetDataset, Split};
    use crate::model::architecture::init_model;
    use crate::model::loss::criterion;
    use crate::model::BassetConfig;
    use burn::backend::{Autodiff, NdArray};
    use burn::module::AutodiffModule;
    use burn::optim::AdamConfig;

    type TestBackend = NdArray<f32>;
    type TestAutodiffBackend = Autodiff<TestBackend>;

    fn open(fixture: &crate::data::fixtures::Fixture, split: Split) -> BassetDataset {
        let shape = BassetConfig::small(60, 5).dataset_shape();
        BassetDataset::with_shape(&fixture.path, split, shape).unwrap()
    }

    fn config(auc_window: usize) -> TrainingConfig {
        TrainingConfig {
            batch_size: 2,
            auc_window,
            ..TrainingConfig::quick_test()
        }
    }

    #[test]
    fn test_train_epoch_counts_windows() {
        let fixture = write_dataset([8, 2, 1], 60, 5);
        let train = open(&fixture, Split::Train);
        let device = <TestAutodiffBackend as Backend>::Device::default();

        let model =
            init_model::<TestAutodiffBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let mut optim = AdamConfig::new().init();
        let loader = BatchLoader::new(&train, 2);

        // 4 batches in windows of 3: one sample, one batch dropped
        let (_, outcome) =
            train_epoch(model, &loader, &device, &mut optim, criterion(), &config(3)).unwrap();

        assert_eq!(outcome.batches, 4);
        assert!(outcome.loss.is_finite() && outcome.loss > 0.0);
        assert!((0.0..=1.0).contains(&outcome.score), "score = {}", outcome.score);
    }

    #[test]
    fn test_train_epoch_updates_parameters() {
        let fixture = write_dataset([6, 2, 1], 60, 5);
        let train = open(&fixture, Split::Train);
        let device = <TestAutodiffBackend as Backend>::Device::default();

        let model =
            init_model::<TestAutodiffBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let probe = Tensor::<TestBackend, 4>::ones([1, 1, 60, 4], &device);
        let before = tensor_values(model.valid().forward(probe.clone(), Mode::Inference)).unwrap();

        let mut optim = AdamConfig::new().init();
        let loader = BatchLoader::new(&train, 2);
        let (model, outcome) =
            train_epoch(model, &loader, &device, &mut optim, criterion(), &config(2)).unwrap();
        let after = tensor_values(model.valid().forward(probe, Mode::Inference)).unwrap();

        assert_eq!(outcome.batches, 3);
        assert_ne!(before, after);
    }

    #[test]
    fn test_train_epoch_single_batch_short_of_window() {
        let fixture = write_dataset([2, 1, 1], 60, 5);
        let train = open(&fixture, Split::Train);
        let device = <TestAutodiffBackend as Backend>::Device::default();

        let model =
            init_model::<TestAutodiffBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let mut optim = AdamConfig::new().init();
        let loader = BatchLoader::new(&train, 2);
        let config = TrainingConfig {
            log_every: 1,
            ..config(50)
        };

        let (_, outcome) =
            train_epoch(model, &loader, &device, &mut optim, criterion(), &config).unwrap();

        assert_eq!(outcome.batches, 1);
        assert_eq!(outcome.score, 0.0);
        assert!(outcome.loss.is_finite() && outcome.loss > 0.0);
    }

    #[test]
    fn test_report_waits_for_a_full_window() {
        assert!(!report_due(10, 10, 0));
        assert!(report_due(10, 10, 1));
        assert!(!report_due(11, 10, 1));
        assert!(!report_due(10, 0, 3));
    }

    #[test]
    fn test_train_epoch_on_empty_split() {
        let fixture = write_dataset([0, 1, 1], 60, 5);
        let train = open(&fixture, Split::Train);
        let device = <TestAutodiffBackend as Backend>::Device::default();

        let model =
            init_model::<TestAutodiffBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let mut optim = AdamConfig::new().init();
        let loader = BatchLoader::new(&train, 2);

        let (_, outcome) =
            train_epoch(model, &loader, &device, &mut optim, criterion(), &config(50)).unwrap();
        assert_eq!(outcome, EpochOutcome::default());
    }

    #[test]
    fn test_validate_epoch_averages_batches() {
        let fixture = write_dataset([1, 5, 1], 60, 5);
        let valid = open(&fixture, Split::Valid);
        let device = <TestBackend as Backend>::Device::default();

        let model = init_model::<TestBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let loader = BatchLoader::new(&valid, 2);
        let outcome = validate_epoch(&model, &loader, &device, criterion()).unwrap();

        assert_eq!(outcome.batches, 3);
        assert!((0.0..=1.0).contains(&outcome.score));
        // mean binary cross-entropy of an untrained network sits near ln 2
        assert!(outcome.loss > 0.1 && outcome.loss < 5.0, "loss = {}", outcome.loss);
    }

    #[test]
    fn test_validate_epoch_is_repeatable() {
        let fixture = write_dataset([1, 4, 1], 60, 5);
        let valid = open(&fixture, Split::Valid);
        let device = <TestBackend as Backend>::Device::default();

        let model = init_model::<TestBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let loader = BatchLoader::new(&valid, 3);
        let first = validate_epoch(&model, &loader, &device, criterion()).unwrap();
        let second = validate_epoch(&model, &loader, &device, criterion()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_split_yields_zero() {
        let fixture = write_dataset([2, 0, 1], 60, 5);
        let valid = open(&fixture, Split::Valid);
        let device = <TestBackend as Backend>::Device::default();

        let model = init_model::<TestBackend>(&BassetConfig::small(60, 5), &device).unwrap();
        let outcome =
            validate_epoch(&model, &BatchLoader::new(&valid, 2), &device, criterion()).unwrap();
        assert_eq!(outcome, EpochOutcome::default());
    }
}
