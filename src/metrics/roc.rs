use crate::error::MetricError;
use std::cmp::Ordering;

/// Spacing between consecutive decision thresholds
pub const DEFAULT_THRESHOLD_STEP: f64 = 0.05;

/// Number of thresholds on the default grid (0.00 through 0.95)
pub const DEFAULT_THRESHOLD_COUNT: usize = 20;

/// False and true positive rates at a single decision threshold
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfusionRates {
    /// False positive rate (false alarms over actual negatives)
    pub fpr: f64,
    /// True positive rate (recall)
    pub tpr: f64,
}

/// How a real-valued score is turned into a binary decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Binarize {
    /// Positive when `score >= threshold`
    #[default]
    AtLeast,
    /// Positive when `score > threshold`
    Above,
}

impl Binarize {
    fn decide(self, score: f32, threshold: f64) -> u8 {
        let score = f64::from(score);
        let positive = match self {
            Binarize::AtLeast => score >= threshold,
            Binarize::Above => score > threshold,
        };
        positive as u8
    }
}

/// Evenly spaced decision thresholds starting at zero
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdGrid {
    step: f64,
    count: usize,
}

impl ThresholdGrid {
    /// Grid of `count` thresholds `0, step, 2 * step, ...`
    pub fn new(step: f64, count: usize) -> Self {
        Self { step, count }
    }

    /// Threshold at grid position `index`
    pub fn threshold(&self, index: usize) -> f64 {
        index as f64 * self.step
    }

    /// Iterate the thresholds in ascending order
    pub fn thresholds(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.count).map(move |i| self.threshold(i))
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

impl Default for ThresholdGrid {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_STEP, DEFAULT_THRESHOLD_COUNT)
    }
}

fn check_binary(labels: &[u8]) -> Result<(), MetricError> {
    match labels.iter().position(|&v| v > 1) {
        Some(index) => Err(MetricError::NonBinaryLabel {
            index,
            value: labels[index],
        }),
        None => Ok(()),
    }
}

/// Compute false and true positive rates of binary decisions
///
/// Both classes must be present in `y_true`; an empty class makes one of
/// the rates undefined and is reported as an error instead of being
/// replaced by zero.
pub fn confusion_rates(y_true: &[u8], y_pred: &[u8]) -> Result<ConfusionRates, MetricError> {
    if y_true.len() != y_pred.len() {
        return Err(MetricError::LengthMismatch {
            truth: y_true.len(),
            predicted: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricError::EmptyInput);
    }
    check_binary(y_true)?;
    check_binary(y_pred)?;

    let mut positives = 0usize;
    let mut true_positives = 0usize;
    let mut false_positives = 0usize;
    for (&truth, &pred) in y_true.iter().zip(y_pred) {
        if truth == 1 {
            positives += 1;
            if pred == 1 {
                true_positives += 1;
            }
        } else if pred == 1 {
            false_positives += 1;
        }
    }
    let negatives = y_true.len() - positives;

    if positives == 0 {
        return Err(MetricError::NoPositives);
    }
    if negatives == 0 {
        return Err(MetricError::NoNegatives);
    }

    Ok(ConfusionRates {
        fpr: false_positives as f64 / negatives as f64,
        tpr: true_positives as f64 / positives as f64,
    })
}

/// ROC points traced over a threshold grid, in grid order
#[derive(Debug, Clone, PartialEq)]
pub struct RocCurve {
    /// Thresholds, ascending
    pub thresholds: Vec<f64>,
    /// False positive rate at each threshold
    pub fpr: Vec<f64>,
    /// True positive rate at each threshold
    pub tpr: Vec<f64>,
}

impl RocCurve {
    /// `(fpr, tpr)` pairs stably sorted by false positive rate
    ///
    /// Pairs that tie on FPR keep their grid order.
    pub fn sorted_points(&self) -> Vec<(f64, f64)> {
        let mut points: Vec<(f64, f64)> = self
            .fpr
            .iter()
            .copied()
            .zip(self.tpr.iter().copied())
            .collect();
        points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        points
    }

    /// Trapezoidal area under the sorted curve
    pub fn auc(&self) -> f64 {
        let (x, y): (Vec<f64>, Vec<f64>) = self.sorted_points().into_iter().unzip();
        trapezoid(&x, &y)
    }
}

/// Trace the ROC curve of `y_score` against `y_true` over `grid`
pub fn roc_curve(
    y_true: &[u8],
    y_score: &[f32],
    grid: &ThresholdGrid,
    rule: Binarize,
) -> Result<RocCurve, MetricError> {
    if y_true.len() != y_score.len() {
        return Err(MetricError::LengthMismatch {
            truth: y_true.len(),
            predicted: y_score.len(),
        });
    }

    let mut curve = RocCurve {
        thresholds: Vec::with_capacity(grid.len()),
        fpr: Vec::with_capacity(grid.len()),
        tpr: Vec::with_capacity(grid.len()),
    };
    let mut y_pred = vec![0u8; y_score.len()];

    for threshold in grid.thresholds() {
        for (pred, &score) in y_pred.iter_mut().zip(y_score) {
            *pred = rule.decide(score, threshold);
        }
        let rates = confusion_rates(y_true, &y_pred)?;
        curve.thresholds.push(threshold);
        curve.fpr.push(rates.fpr);
        curve.tpr.push(rates.tpr);
    }

    Ok(curve)
}

/// Area under the ROC curve on the default 20-point grid
///
/// Scores are binarized with `score >= k`. The coarse grid makes this a
/// biased estimate of the continuous AUC; see [`rank_auc`] for the exact
/// value.
pub fn roc_auc(y_true: &[u8], y_score: &[f32]) -> Result<f64, MetricError> {
    let curve = roc_curve(y_true, y_score, &ThresholdGrid::default(), Binarize::AtLeast)?;
    Ok(curve.auc())
}

/// Trapezoidal integral of `y` over `x`
pub fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

/// Exact AUC from the rank-sum (Mann-Whitney U) statistic
///
/// Tied scores receive their average rank, so a tie between a positive and
/// a negative counts as half a correct ordering.
pub fn rank_auc(y_true: &[u8], y_score: &[f32]) -> Result<f64, MetricError> {
    if y_true.len() != y_score.len() {
        return Err(MetricError::LengthMismatch {
            truth: y_true.len(),
            predicted: y_score.len(),
        });
    }
    if y_true.is_empty() {
        return Err(MetricError::EmptyInput);
    }
    check_binary(y_true)?;

    let positives = y_true.iter().filter(|&&v| v == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 {
        return Err(MetricError::NoPositives);
    }
    if negatives == 0 {
        return Err(MetricError::NoNegatives);
    }

    let mut order: Vec<usize> = (0..y_score.len()).collect();
    order.sort_by(|&a, &b| y_score[a].total_cmp(&y_score[b]));

    let mut positive_rank_sum = 0.0f64;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && y_score[order[end]] == y_score[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group spans ranks start+1 ..= end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let group_positives = order[start..end].iter().filter(|&&i| y_true[i] == 1).count();
        positive_rank_sum += average_rank * group_positives as f64;
        start = end;
    }

    let positives = positives as f64;
    let u = positive_rank_sum - positives * (positives + 1.0) / 2.0;
    Ok(u / (positives * negatives as f64))
}
