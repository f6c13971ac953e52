pub mod callbacks;
pub mod trainer;

use crate::data::preprocessing::ModelInputs;
use crate::predict::Predictor;
use burn::tensor::backend::Backend;
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// What one epoch produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based epoch number
    pub epoch: usize,
    /// Loss of the final batch
    pub cost: f64,
    /// Configured metric over the full training set
    pub metric: f64,
    /// Gradient steps taken
    pub batches: usize,
}

/// Training state
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Completed epochs
    pub epoch: usize,
    /// Gradient steps across all epochs
    pub global_step: usize,
    /// One report per completed epoch
    pub reports: Vec<EpochReport>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a finished epoch
    pub fn update_epoch(&mut self, report: EpochReport) {
        self.epoch = report.epoch;
        self.global_step += report.batches;
        self.reports.push(report);
    }

    /// Report of the most recent epoch
    pub fn last_report(&self) -> Option<&EpochReport> {
        self.reports.last()
    }
}

/// Training result
#[derive(Debug)]
pub struct TrainingResult<B: Backend> {
    /// Final training state
    pub state: TrainingState,
    /// Trained model, ready for scoring
    pub predictor: Predictor<B>,
    /// Training duration in seconds
    pub duration_secs: f64,
    /// Seed used for parameter initialization
    pub seed: u64,
}

/// One contiguous minibatch
#[derive(Debug, Clone)]
pub struct TrainingBatch {
    pub inputs: ModelInputs,
    pub labels: Vec<f32>,
}

impl TrainingBatch {
    /// Copy rows `range` out of the full training set
    pub fn slice(inputs: &ModelInputs, labels: &[f32], range: Range<usize>) -> Self {
        Self {
            inputs: inputs.slice_rows(range.clone()),
            labels: labels[range].to_vec(),
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Split `rows` into consecutive ranges of `batch_size`; the last may be shorter
pub fn batch_ranges(rows: usize, batch_size: usize) -> Vec<Range<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..rows)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(rows))
        .collect()
}
