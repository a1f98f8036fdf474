use crate::error::MetricError;
use crate::metrics::roc_auc;

/// Buffers predictions over a window of batches and scores them together
///
/// Per-batch AUC is noisy and expensive to compute after every step, so the
/// training loop scores the concatenation of `window` consecutive batches
/// instead. A window that is never filled is never scored.
#[derive(Debug, Clone)]
pub struct PeriodicAuc {
    window: usize,
    batches: usize,
    labels: Vec<u8>,
    scores: Vec<f32>,
}

impl PeriodicAuc {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            batches: 0,
            labels: Vec::new(),
            scores: Vec::new(),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Batches buffered since the last flush
    pub fn pending(&self) -> usize {
        self.batches
    }

    /// Buffer one batch of flattened probabilities and their labels
    pub fn observe(&mut self, probabilities: &[f32], targets: &[u8]) {
        self.scores.extend_from_slice(probabilities);
        self.labels.extend_from_slice(targets);
        self.batches += 1;
    }

    /// Score the buffer once the window is full, then start a new window
    pub fn flush(&mut self) -> Result<Option<f64>, MetricError> {
        if self.batches < self.window {
            return Ok(None);
        }
        let auc = roc_auc(&self.labels, &self.scores);
        self.reset();
        auc.map(Some)
    }

    /// Drop whatever is buffered
    pub fn reset(&mut self) {
        self.batches = 0;
        self.labels.clear();
        self.scores.clear();
    }
}
