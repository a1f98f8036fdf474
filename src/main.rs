use anyhow::{Context, Result};
use basset::cli::{
    parse_args, setup_logging, Commands, EvaluateArgs, PredictArgs, SimulateArgs, TrainArgs,
};
use basset::data::{BassetDataset, Split};
use basset::metrics::simulation::{simulated_aucs, simulated_curves};
use basset::model::architecture::init_model;
use basset::model::BassetConfig;
use basset::predict::Predictor;
use basset::training::{trainer::Trainer, TrainingConfig};
use basset::{DefaultBackend, TrainingBackend};
use burn::prelude::Backend;
use serde_json::json;
use std::path::Path;
use tracing::{error, info, warn};

fn main() {
    let cli = parse_args();

    setup_logging(cli.verbose);

    info!("{}", basset::info());

    let result = match cli.command {
        Commands::Train(args) => run_train(args),
        Commands::Evaluate(args) => run_evaluate(args),
        Commands::Predict(args) => run_predict(args),
        Commands::Simulate(args) => run_simulate(args),
    };

    if let Err(e) = result {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_model_config(path: Option<&Path>) -> Result<BassetConfig> {
    let config = match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read model config {:?}", path))?;
            serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse model config {:?}", path))?
        }
        None => BassetConfig::basset_default(),
    };
    let geometry = config.geometry().context("Invalid model configuration")?;
    info!(
        "Feature map heights {:?}, {} features into the dense layers",
        geometry.heights, geometry.flattened
    );
    Ok(config)
}

fn open_split(data: &Path, split: &str, config: &BassetConfig) -> Result<BassetDataset> {
    let split: Split = split.parse()?;
    BassetDataset::with_shape(data, split, config.dataset_shape())
        .with_context(|| format!("Failed to open {} split of {:?}", split, data))
}

fn run_train(args: TrainArgs) -> Result<()> {
    info!("Data file: {:?}", args.data);
    info!("Output directory: {:?}", args.output);

    let base = match (&args.config, args.quick) {
        (Some(path), _) => TrainingConfig::from_json_file(path)?,
        (None, true) => TrainingConfig::quick_test(),
        (None, false) => TrainingConfig::default(),
    };
    let training_config = args.apply_overrides(base);
    let model_config = load_model_config(args.model_config.as_deref())?;

    let train = open_split(&args.data, "train", &model_config)?;
    let valid = open_split(&args.data, "valid", &model_config)?;

    basset::utils::ensure_dir(&args.output)?;
    let checkpoint_dir = args.output.join("checkpoints");

    let device = <TrainingBackend as Backend>::Device::default();
    let mut trainer = Trainer::<TrainingBackend>::new(training_config, model_config, device)
        .with_checkpoint_dir(&checkpoint_dir)?;

    let (_, result) = trainer.fit(&train, &valid).context("Training failed")?;

    info!("=== Training Results ===");
    info!("Epochs run: {}", result.state.epoch);
    info!("Best validation AUC: {:.4}", result.state.best_metric);
    info!(
        "Training time: {}",
        basset::utils::format_duration(result.duration_secs)
    );
    if let Some(ref checkpoint) = result.best_checkpoint {
        info!("Best model saved to: {:?}", checkpoint);
    }

    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    let device = <DefaultBackend as Backend>::Device::default();

    let predictor = match &args.model {
        Some(path) => Predictor::<DefaultBackend>::from_checkpoint(path, device)
            .with_context(|| format!("Failed to load model from {:?}", path))?,
        None => {
            warn!("No checkpoint given, evaluating an untrained network");
            DefaultBackend::seed(args.seed);
            let config = load_model_config(None)?;
            let model = init_model::<DefaultBackend>(&config, &device)?;
            Predictor::new(model, config, device)
        }
    }
    .with_batch_size(args.batch_size);

    let dataset = open_split(&args.data, &args.split, predictor.model_config())?;
    let predictions = predictor
        .predict_split(&dataset)
        .context("Evaluation failed")?;
    let report = predictions.report()?;

    info!("=== Evaluation: {} split ===", report.split);
    info!("Sequences: {}", report.sequences);
    info!("Loss: {:.4}", report.loss);
    info!("AUC (grid): {:.4}", report.auc);
    info!("AUC (rank): {:.4}", report.rank_auc);
    if let Some(mean) = report.mean_target_auc {
        info!("Mean per-cell-type AUC: {:.4}", mean);
    }

    if let Some(output) = args.output {
        report.save_json(output)?;
    }

    Ok(())
}

fn run_predict(args: PredictArgs) -> Result<()> {
    let device = <DefaultBackend as Backend>::Device::default();

    let predictor = Predictor::<DefaultBackend>::from_checkpoint(&args.model, device)
        .with_context(|| format!("Failed to load model from {:?}", args.model))?
        .with_batch_size(args.batch_size);

    let dataset = open_split(&args.data, &args.split, predictor.model_config())?;
    let predictions = predictor
        .predict_split(&dataset)
        .context("Prediction failed")?;

    predictions.save_predictions_to_csv(&args.output)?;
    info!("Predictions saved to: {:?}", args.output);

    Ok(())
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let aucs = simulated_aucs(args.samples, args.seed)?;
    info!("Uninformed model AUC: {:.4}", aucs.uninformed);
    info!("Informed model AUC: {:.4}", aucs.informed);

    if let Some(output) = args.output {
        let curves = simulated_curves(args.samples, args.seed)?;
        let report = json!({
            "samples": args.samples,
            "seed": args.seed,
            "auc": aucs,
            "uninformed": { "fpr": curves.uninformed.fpr, "tpr": curves.uninformed.tpr },
            "informed": { "fpr": curves.informed.fpr, "tpr": curves.informed.tpr },
            "thresholds": curves.informed.thresholds,
        });
        std::fs::write(&output, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("Failed to write {:?}", output))?;
        info!("ROC curves saved to: {:?}", output);
    }

    Ok(())
}
