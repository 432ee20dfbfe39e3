//! Per-epoch metric tracking.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Loss and accuracy for one split after one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub loss: f64,
    pub accuracy: f64,
}

impl MetricPoint {
    /// Result reported for a split whose loader yielded no samples.
    pub const NO_DATA: Self = Self {
        loss: 0.0,
        accuracy: 1.0,
    };

    pub fn new(loss: f64, accuracy: f64) -> Self {
        Self { loss, accuracy }
    }
}

/// A data split with its own loader and history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Validation,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Validation => "validation",
            Self::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered metric points for one split, one per completed epoch.
///
/// Append-only: entries are never reordered or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricHistory {
    points: Vec<MetricPoint>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a history from parallel loss and accuracy columns.
    ///
    /// Returns `None` when the columns have different lengths.
    pub fn from_columns(losses: &[f64], accuracies: &[f64]) -> Option<Self> {
        if losses.len() != accuracies.len() {
            return None;
        }
        let points = losses
            .iter()
            .zip(accuracies)
            .map(|(&loss, &accuracy)| MetricPoint { loss, accuracy })
            .collect();
        Some(Self { points })
    }

    pub fn push(&mut self, point: MetricPoint) {
        self.points.push(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<&MetricPoint> {
        self.points.last()
    }

    pub fn points(&self) -> &[MetricPoint] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricPoint> {
        self.points.iter()
    }

    pub fn losses(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.loss).collect()
    }

    pub fn accuracies(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.accuracy).collect()
    }
}

/// Histories returned by the train/test loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainTestHistory {
    pub train: MetricHistory,
    pub test: MetricHistory,
}

impl TrainTestHistory {
    /// Number of completed epochs.
    pub fn epochs(&self) -> usize {
        self.train.len()
    }
}

/// Histories returned by the train/validation/test loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainValTestHistory {
    pub train: MetricHistory,
    pub validation: MetricHistory,
    pub test: MetricHistory,
    /// Set when the loop ended because the stall counter reached patience.
    pub stopped_early: bool,
}

impl TrainValTestHistory {
    pub fn epochs(&self) -> usize {
        self.train.len()
    }
}
