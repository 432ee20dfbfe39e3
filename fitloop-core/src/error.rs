//! Error types for the fitloop-core crate.

use crate::collab::CollabError;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for a training run.
///
/// Collaborator failures keep their original error as the `source`; the
/// orchestrator never retries.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Batch shape mismatch: {0}")]
    BatchShape(String),

    #[error("Model failure: {0}")]
    Model(#[source] CollabError),

    #[error("Loss failure: {0}")]
    Loss(#[source] CollabError),

    #[error("Optimizer failure: {0}")]
    Optimizer(#[source] CollabError),

    #[error("Scheduler failure: {0}")]
    Scheduler(#[source] CollabError),

    #[error("Plotting failure: {0}")]
    Plot(#[source] CollabError),

    #[error("Loader failure: {0}")]
    Loader(#[source] CollabError),
}

impl TrainError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn batch_shape(msg: impl Into<String>) -> Self {
        Self::BatchShape(msg.into())
    }
}

/// Failures reading or writing a checkpoint location.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// The artifacts on disk cannot be resumed from: one is missing, unreadable,
    /// or they describe different epochs.
    #[error("Corrupt checkpoint at {}: {reason}", dir.display())]
    Corrupt { dir: PathBuf, reason: String },

    #[error("Checkpoint IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checkpoint serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl CheckpointError {
    pub fn corrupt(dir: &Path, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            dir: dir.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}
