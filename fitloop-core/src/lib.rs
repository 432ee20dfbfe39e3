//! # fitloop-core: Training-Loop Orchestration
//!
//! Drives repeated train/evaluate passes for supervised classifiers that the
//! caller has already built. The crate owns the loop mechanics and nothing
//! else: models, losses, optimizers, schedulers, plotters, and data loaders
//! are collaborators reached through the traits in [`collab`].
//!
//! ## Pieces
//!
//! 1. **Step strategies** ([`strategy`]): one batch in, `(loss, correct, samples)` out
//! 2. **Aggregation** ([`aggregate`]): full loader passes folded into a [`MetricPoint`]
//! 3. **Checkpoints** ([`checkpoint`]): model blob + metric record, validated on resume
//! 4. **Early stopping** ([`early_stopping`]): best validation accuracy and a stall counter
//! 5. **Orchestrator** ([`orchestrator`]): the epoch loop tying them together

pub mod aggregate;
pub mod batch;
pub mod checkpoint;
pub mod collab;
pub mod config;
pub mod early_stopping;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod persistence;
pub mod plot;
pub mod strategy;

#[cfg(test)]
pub(crate) mod mock;

pub use batch::{CoordinateBatch, StandardBatch};
pub use checkpoint::{CheckpointLocation, CheckpointRecord, CheckpointStore};
pub use collab::{
    BatchDim, Classifier, CollabError, CoordinateClassifier, Device, ExecutionContext,
    InMemoryLoader, Loader, LossFn, Mode, Optimizer, Plotter, Scheduler, Scores,
};
pub use config::{ConfigOverrides, LoopKind, TrainingConfig, load_config};
pub use early_stopping::EarlyStopping;
pub use error::{CheckpointError, TrainError};
pub use metrics::{MetricHistory, MetricPoint, Split, TrainTestHistory, TrainValTestHistory};
pub use orchestrator::Orchestrator;
pub use plot::SvgPlotter;
pub use strategy::{CoordinateStep, StandardStep, StepOutcome, StepStrategy};
