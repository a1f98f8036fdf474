//! Synthetic score generators used to sanity-check the ROC estimator.
//!
//! The *uninformed* model scores every example uniformly at random, so its
//! curve hugs the diagonal. The *informed* model draws negatives from
//! U(0, 0.6) and positives from U(0.4, 1), giving a curve well above it.

use crate::error::MetricError;
use crate::metrics::roc::{roc_auc, roc_curve, Binarize, RocCurve, ThresholdGrid};
use crate::utils::random::seeded_rng;
use rand::Rng;
use serde::Serialize;

/// Labels paired with model scores
#[derive(Debug, Clone)]
pub struct SimulatedScores {
    pub labels: Vec<u8>,
    pub scores: Vec<f32>,
}

/// Balanced Bernoulli labels with scores independent of the label
pub fn simulate_uninformed(samples: usize, seed: u64) -> SimulatedScores {
    let mut rng = seeded_rng(seed);
    let labels: Vec<u8> = (0..samples).map(|_| rng.gen_bool(0.5) as u8).collect();
    let scores = (0..samples).map(|_| rng.gen::<f32>()).collect();
    SimulatedScores { labels, scores }
}

/// Balanced Bernoulli labels with overlapping, label-dependent scores
pub fn simulate_informed(samples: usize, seed: u64) -> SimulatedScores {
    let mut rng = seeded_rng(seed);
    let labels: Vec<u8> = (0..samples).map(|_| rng.gen_bool(0.5) as u8).collect();
    let scores = labels
        .iter()
        .map(|&label| {
            if label == 1 {
                rng.gen_range(0.4f32..1.0)
            } else {
                rng.gen_range(0.0f32..0.6)
            }
        })
        .collect();
    SimulatedScores { labels, scores }
}

/// ROC curves of both simulated models on the default grid
#[derive(Debug, Clone)]
pub struct SimulatedCurves {
    pub uninformed: RocCurve,
    pub informed: RocCurve,
}

/// Trace both curves with strict (`score > k`) decisions
pub fn simulated_curves(samples: usize, seed: u64) -> Result<SimulatedCurves, MetricError> {
    let grid = ThresholdGrid::default();
    let uninformed = simulate_uninformed(samples, seed);
    let informed = simulate_informed(samples, seed.wrapping_add(1));

    Ok(SimulatedCurves {
        uninformed: roc_curve(&uninformed.labels, &uninformed.scores, &grid, Binarize::Above)?,
        informed: roc_curve(&informed.labels, &informed.scores, &grid, Binarize::Above)?,
    })
}

/// Grid AUC of both simulated models
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SimulatedAucs {
    pub uninformed: f64,
    pub informed: f64,
}

pub fn simulated_aucs(samples: usize, seed: u64) -> Result<SimulatedAucs, MetricError> {
    let uninformed = simulate_uninformed(samples, seed);
    let informed = simulate_informed(samples, seed.wrapping_add(1));

    Ok(SimulatedAucs {
        uninformed: roc_auc(&uninformed.labels, &uninformed.scores)?,
        informed: roc_auc(&informed.labels, &informed.scores)?,
    })
}
