pub mod roc;
pub mod simulation;

pub use roc::{
    confusion_rates, rank_auc, roc_auc, roc_curve, Binarize, ConfusionRates, RocCurve,
    ThresholdGrid,
};
