use crate::training::TrainingConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Basset: chromatin accessibility prediction from DNA sequence
#[derive(Parser, Debug)]
#[command(name = "basset")]
#[command(about = "Chromatin accessibility prediction from DNA sequence")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a new model on the train split, selecting on the valid split
    Train(TrainArgs),

    /// Report loss and AUC of a model on one split
    Evaluate(EvaluateArgs),

    /// Write per-sequence probabilities for one split
    Predict(PredictArgs),

    /// Compare ROC curves of simulated uninformed and informed models
    Simulate(SimulateArgs),
}

/// Training arguments
#[derive(Parser, Debug)]
pub struct TrainArgs {
    /// Dataset file (safetensors)
    #[arg(short, long, required = true)]
    pub data: PathBuf,

    /// Output directory for checkpoints
    #[arg(short, long, default_value = "./output")]
    pub output: PathBuf,

    /// Training configuration file (JSON); flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Network configuration file (JSON)
    #[arg(long)]
    pub model_config: Option<PathBuf>,

    /// Number of training epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Batch size
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Learning rate
    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Early stopping patience (0 disables)
    #[arg(long)]
    pub patience: Option<usize>,

    /// Random seed
    #[arg(long)]
    pub seed: Option<u64>,

    /// Quick test mode (fewer epochs, small batches)
    #[arg(long)]
    pub quick: bool,
}

impl TrainArgs {
    /// Apply the command-line overrides on top of `config`
    pub fn apply_overrides(&self, mut config: TrainingConfig) -> TrainingConfig {
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(patience) = self.patience {
            config.early_stopping_patience = patience;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config
    }
}

/// Evaluation arguments
#[derive(Parser, Debug)]
pub struct EvaluateArgs {
    /// Dataset file (safetensors)
    #[arg(short, long, required = true)]
    pub data: PathBuf,

    /// Model checkpoint file; an untrained network is evaluated when omitted
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Split to evaluate (train, valid or test)
    #[arg(short, long, default_value = "test")]
    pub split: String,

    /// Output file for the JSON evaluation report
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Batch size for evaluation
    #[arg(short, long, default_value = "128")]
    pub batch_size: usize,

    /// Seed for the untrained network
    #[arg(long, default_value = "2026")]
    pub seed: u64,
}

/// Prediction arguments
#[derive(Parser, Debug)]
pub struct PredictArgs {
    /// Dataset file (safetensors)
    #[arg(short, long, required = true)]
    pub data: PathBuf,

    /// Model checkpoint file
    #[arg(short, long, required = true)]
    pub model: PathBuf,

    /// Split to predict (train, valid or test)
    #[arg(short, long, default_value = "test")]
    pub split: String,

    /// Output CSV file, gzip-compressed when it ends in .gz
    #[arg(short, long, default_value = "predictions.csv")]
    pub output: PathBuf,

    /// Batch size for prediction
    #[arg(short, long, default_value = "128")]
    pub batch_size: usize,
}

/// Simulation arguments
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Number of simulated sequences per model
    #[arg(short = 'n', long, default_value = "1000")]
    pub samples: usize,

    /// Random seed
    #[arg(long, default_value = "2022")]
    pub seed: u64,

    /// Output file for the ROC curves (JSON)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Parse CLI arguments
pub fn parse_args() -> Cli {
    Cli::parse()
}

/// Setup logging based on verbosity; `RUST_LOG` takes precedence
pub fn setup_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_train_args() {
        let cli = Cli::parse_from(["basset", "train", "-d", "er.safetensors", "--epochs", "3"]);

        match cli.command {
            Commands::Train(args) => {
                assert_eq!(args.data, PathBuf::from("er.safetensors"));
                assert_eq!(args.output, PathBuf::from("./output"));

                let config = args.apply_overrides(TrainingConfig::default());
                assert_eq!(config.epochs, 3);
                assert_eq!(config.batch_size, TrainingConfig::default().batch_size);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_overrides_beat_config_file_values() {
        let cli = Cli::parse_from([
            "basset",
            "train",
            "-d",
            "er.safetensors",
            "--learning-rate",
            "0.01",
            "--patience",
            "0",
            "--seed",
            "7",
        ]);

        let Commands::Train(args) = cli.command else {
            panic!("Expected Train command");
        };
        let file_config = TrainingConfig {
            learning_rate: 0.5,
            epochs: 20,
            ..TrainingConfig::default()
        };
        let config = args.apply_overrides(file_config);
        assert_eq!(config.learning_rate, 0.01);
        assert_eq!(config.early_stopping_patience, 0);
        assert_eq!(config.seed, 7);
        assert_eq!(config.epochs, 20);
    }

    #[test]
    fn test_predict_args() {
        let cli = Cli::parse_from([
            "basset",
            "predict",
            "-d",
            "er.safetensors",
            "-m",
            "best_model.mpk",
            "-o",
            "predictions.csv.gz",
            "-v",
        ]);

        assert!(cli.verbose);
        match cli.command {
            Commands::Predict(args) => {
                assert_eq!(args.model, PathBuf::from("best_model.mpk"));
                assert_eq!(args.split, "test");
                assert_eq!(args.output, PathBuf::from("predictions.csv.gz"));
            }
            _ => panic!("Expected Predict command"),
        }
    }

    #[test]
    fn test_evaluate_and_simulate_args() {
        let cli = Cli::parse_from(["basset", "evaluate", "-d", "er.safetensors", "-s", "valid"]);
        match cli.command {
            Commands::Evaluate(args) => {
                assert!(args.model.is_none());
                assert_eq!(args.split, "valid");
            }
            _ => panic!("Expected Evaluate command"),
        }

        let cli = Cli::parse_from(["basset", "simulate", "-n", "500"]);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.samples, 500);
                assert_eq!(args.seed, 2022);
            }
            _ => panic!("Expected Simulate command"),
        }
    }
}
