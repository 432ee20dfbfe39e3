//! Collaborator interfaces driven by the orchestrator.
//!
//! The orchestrator never computes gradients, updates parameters, or reads
//! data itself. Everything it needs from the outside world goes through the
//! traits in this module, and every call that touches compute receives the
//! run's [`ExecutionContext`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Error type returned by collaborators. Kept as the `source` of the
/// [`TrainError`](crate::TrainError) variant that wraps it.
pub type CollabError = Box<dyn std::error::Error + Send + Sync>;

/// Where a run's computation is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Device {
    #[default]
    Cpu,
    Cuda(usize),
    Metal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown device '{0}' (expected cpu, cuda, cuda:N, or metal)")]
pub struct ParseDeviceError(String);

impl FromStr for Device {
    type Err = ParseDeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda(0)),
            "metal" | "mps" => Ok(Self::Metal),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Self::Cuda)
                .ok_or_else(|| ParseDeviceError(s.to_string())),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda(idx) => write!(f, "cuda:{idx}"),
            Self::Metal => f.write_str("metal"),
        }
    }
}

impl TryFrom<String> for Device {
    type Error = ParseDeviceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Device> for String {
    fn from(device: Device) -> Self {
        device.to_string()
    }
}

/// Explicit execution context threaded through every collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecutionContext {
    pub device: Device,
}

impl ExecutionContext {
    pub fn new(device: Device) -> Self {
        Self { device }
    }
}

/// Training-mode / inference-mode toggle for models with mode-dependent layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// Leading (batch) dimension of a tensor-like value.
pub trait BatchDim {
    fn batch_dim(&self) -> usize;
}

impl<T> BatchDim for Vec<T> {
    fn batch_dim(&self) -> usize {
        self.len()
    }
}

impl<T> BatchDim for [T] {
    fn batch_dim(&self) -> usize {
        self.len()
    }
}

/// Per-row class scores produced by a model.
pub trait Scores {
    fn rows(&self) -> usize;

    /// Index of the highest score in each row.
    fn argmax(&self) -> Vec<usize>;
}

/// A classification model.
///
/// `forward` borrows the model immutably so evaluation cannot mutate
/// parameters. Gradients accumulate inside the model through `backward` and
/// are consumed by an [`Optimizer`].
pub trait Classifier {
    type Input;
    type Output: Scores;

    fn set_mode(&mut self, mode: Mode);

    fn forward(
        &self,
        ctx: &ExecutionContext,
        input: &Self::Input,
    ) -> Result<Self::Output, CollabError>;

    /// Accumulate parameter gradients given the loss gradient w.r.t. the output.
    fn backward(
        &mut self,
        ctx: &ExecutionContext,
        input: &Self::Input,
        output_grad: &Self::Output,
    ) -> Result<(), CollabError>;

    /// Serialize parameters to an opaque blob.
    fn save_parameters(&self) -> Result<Vec<u8>, CollabError>;

    fn load_parameters(&mut self, blob: &[u8]) -> Result<(), CollabError>;
}

/// A classifier that additionally consumes per-sample coordinates and a mask.
pub trait CoordinateClassifier: Classifier {
    type Coords;
    type Mask;

    fn forward_with_coords(
        &self,
        ctx: &ExecutionContext,
        input: &Self::Input,
        coords: &Self::Coords,
        mask: &Self::Mask,
    ) -> Result<Self::Output, CollabError>;

    fn backward_with_coords(
        &mut self,
        ctx: &ExecutionContext,
        input: &Self::Input,
        coords: &Self::Coords,
        mask: &Self::Mask,
        output_grad: &Self::Output,
    ) -> Result<(), CollabError>;
}

/// A differentiable loss over model output `O`.
///
/// Implementations return the loss summed over the batch; the orchestrator
/// decides whether to normalise by sample count.
pub trait LossFn<O> {
    fn value(
        &self,
        ctx: &ExecutionContext,
        output: &O,
        labels: &[usize],
    ) -> Result<f64, CollabError>;

    /// Loss value plus its gradient w.r.t. `output`.
    fn value_and_grad(
        &self,
        ctx: &ExecutionContext,
        output: &O,
        labels: &[usize],
    ) -> Result<(f64, O), CollabError>;
}

pub trait Optimizer<M> {
    fn zero_grad(&mut self, model: &mut M);

    fn step(&mut self, ctx: &ExecutionContext, model: &mut M) -> Result<(), CollabError>;
}

/// Per-epoch learning-rate scheduler.
pub trait Scheduler {
    fn step(
        &mut self,
        ctx: &ExecutionContext,
        epoch: usize,
        metric: f64,
    ) -> Result<(), CollabError>;
}

/// Renders two series against shared x values to `path`.
pub trait Plotter {
    fn render(
        &mut self,
        x: &[usize],
        series_a: &[f64],
        series_b: &[f64],
        title: &str,
        path: &Path,
    ) -> Result<(), CollabError>;
}

/// A re-iterable source of batches for one split.
///
/// Iteration order is authoritative and is consumed strictly in sequence.
pub trait Loader {
    type Batch;

    fn batches(&self) -> Box<dyn Iterator<Item = Result<Self::Batch, CollabError>> + '_>;
}

/// Loader over batches already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader<B> {
    batches: Vec<B>,
}

impl<B> InMemoryLoader<B> {
    pub fn new(batches: Vec<B>) -> Self {
        Self { batches }
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }
}

impl<B> FromIterator<B> for InMemoryLoader<B> {
    fn from_iter<I: IntoIterator<Item = B>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<B: Clone> Loader for InMemoryLoader<B> {
    type Batch = B;

    fn batches(&self) -> Box<dyn Iterator<Item = Result<B, CollabError>> + '_> {
        Box::new(self.batches.iter().cloned().map(Ok))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_parse() {
        assert_eq!("cpu".parse::<Device>().unwrap(), Device::Cpu);
        assert_eq!("CUDA".parse::<Device>().unwrap(), Device::Cuda(0));
        assert_eq!("cuda:3".parse::<Device>().unwrap(), Device::Cuda(3));
        assert_eq!("mps".parse::<Device>().unwrap(), Device::Metal);
        assert!("tpu".parse::<Device>().is_err());
        assert!("cuda:x".parse::<Device>().is_err());
    }

    #[test]
    fn test_device_display_roundtrip() {
        for device in [Device::Cpu, Device::Cuda(1), Device::Metal] {
            assert_eq!(device.to_string().parse::<Device>().unwrap(), device);
        }
    }

    #[test]
    fn test_device_serde_as_string() {
        let json = serde_json::to_string(&Device::Cuda(2)).unwrap();
        assert_eq!(json, "\"cuda:2\"");
        let device: Device = serde_json::from_str("\"metal\"").unwrap();
        assert_eq!(device, Device::Metal);
    }

    #[test]
    fn test_in_memory_loader_preserves_order() {
        let loader: InMemoryLoader<u32> = vec![3, 1, 2].into_iter().collect();
        let seen: Vec<u32> = loader.batches().map(|b| b.unwrap()).collect();
        assert_eq!(seen, vec![3, 1, 2]);
        // Re-iterable across epochs.
        assert_eq!(loader.batches().count(), 3);
    }
}
