use thiserror::Error;

/// Errors raised by the ROC/AUC metric routines
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricError {
    #[error("label and prediction vectors differ in length: {truth} vs {predicted}")]
    LengthMismatch { truth: usize, predicted: usize },

    #[error("cannot compute rates on empty input")]
    EmptyInput,

    #[error("ground truth has no positive labels, true positive rate is undefined")]
    NoPositives,

    #[error("ground truth has no negative labels, false positive rate is undefined")]
    NoNegatives,

    #[error("label {value} at index {index} is not binary")]
    NonBinaryLabel { index: usize, value: u8 },
}

/// Errors raised while opening or reading a sequence dataset
#[derive(Debug, Error)]
pub enum DataError {
    #[error("split must be one of 'train', 'valid' or 'test', got '{0}'")]
    InvalidSplit(String),

    #[error("index {index} out of range for split of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("array '{0}' not found in dataset file")]
    MissingArray(String),

    #[error("array '{name}' has unsupported dtype {dtype}")]
    UnsupportedDtype { name: String, dtype: String },

    #[error("array '{name}' has shape {actual:?}, expected {expected}")]
    ShapeMismatch {
        name: String,
        actual: Vec<usize>,
        expected: String,
    },

    #[error("input and target arrays disagree on row count: {inputs} vs {targets}")]
    RowCountMismatch { inputs: usize, targets: usize },

    #[error("invalid dataset metadata '{key}': {reason}")]
    Metadata { key: String, reason: String },

    #[error("failed to parse dataset header: {0}")]
    Header(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised when a model configuration cannot produce a valid network
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("stage {stage}: feature map height collapses to zero")]
    CollapsedFeatureMap { stage: usize },

    #[error("{name} must be positive")]
    NonPositive { name: &'static str },

    #[error("dropout must lie in [0, 1), got {0}")]
    Dropout(f64),
}
