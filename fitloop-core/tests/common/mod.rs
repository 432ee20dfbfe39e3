//! Shared collaborators for integration tests.
#![allow(dead_code)]

use fitloop_core::{
    BatchDim, Classifier, CollabError, CoordinateBatch, CoordinateClassifier, ExecutionContext,
    InMemoryLoader, LossFn, Mode, Optimizer, Scores, StandardBatch,
};

/// Each sample's predicted class plus the batch loss at `scale == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Graded {
    pub picks: Vec<usize>,
    pub loss: f64,
}

impl BatchDim for Graded {
    fn batch_dim(&self) -> usize {
        self.picks.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradedScores {
    pub picks: Vec<usize>,
    pub loss: f64,
}

impl Scores for GradedScores {
    fn rows(&self) -> usize {
        self.picks.len()
    }

    fn argmax(&self) -> Vec<usize> {
        self.picks.clone()
    }
}

/// Model with one parameter that shrinks the loss on every optimizer step.
#[derive(Debug, Clone)]
pub struct DecayModel {
    pub scale: f64,
    pub mode: Mode,
}

impl Default for DecayModel {
    fn default() -> Self {
        Self {
            scale: 1.0,
            mode: Mode::Train,
        }
    }
}

impl Classifier for DecayModel {
    type Input = Graded;
    type Output = GradedScores;

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(
        &self,
        _ctx: &ExecutionContext,
        input: &Graded,
    ) -> Result<GradedScores, CollabError> {
        Ok(GradedScores {
            picks: input.picks.clone(),
            loss: input.loss * self.scale,
        })
    }

    fn backward(
        &mut self,
        _ctx: &ExecutionContext,
        _input: &Graded,
        _output_grad: &GradedScores,
    ) -> Result<(), CollabError> {
        Ok(())
    }

    fn save_parameters(&self) -> Result<Vec<u8>, CollabError> {
        Ok(self.scale.to_le_bytes().to_vec())
    }

    fn load_parameters(&mut self, blob: &[u8]) -> Result<(), CollabError> {
        let bytes: [u8; 8] = blob.try_into().map_err(|_| "scale must be 8 bytes")?;
        self.scale = f64::from_le_bytes(bytes);
        Ok(())
    }
}

impl CoordinateClassifier for DecayModel {
    type Coords = Vec<[f64; 2]>;
    type Mask = Vec<bool>;

    fn forward_with_coords(
        &self,
        ctx: &ExecutionContext,
        input: &Graded,
        _coords: &Self::Coords,
        _mask: &Self::Mask,
    ) -> Result<GradedScores, CollabError> {
        self.forward(ctx, input)
    }

    fn backward_with_coords(
        &mut self,
        ctx: &ExecutionContext,
        input: &Graded,
        _coords: &Self::Coords,
        _mask: &Self::Mask,
        output_grad: &GradedScores,
    ) -> Result<(), CollabError> {
        self.backward(ctx, input, output_grad)
    }
}

pub struct GradedLoss;

impl LossFn<GradedScores> for GradedLoss {
    fn value(
        &self,
        _ctx: &ExecutionContext,
        output: &GradedScores,
        _labels: &[usize],
    ) -> Result<f64, CollabError> {
        Ok(output.loss)
    }

    fn value_and_grad(
        &self,
        _ctx: &ExecutionContext,
        output: &GradedScores,
        _labels: &[usize],
    ) -> Result<(f64, GradedScores), CollabError> {
        Ok((output.loss, output.clone()))
    }
}

/// Multiplies the model's scale by `factor` per step.
pub struct DecayOptimizer {
    pub factor: f64,
}

impl Default for DecayOptimizer {
    fn default() -> Self {
        Self { factor: 0.9 }
    }
}

impl Optimizer<DecayModel> for DecayOptimizer {
    fn zero_grad(&mut self, _model: &mut DecayModel) {}

    fn step(&mut self, _ctx: &ExecutionContext, model: &mut DecayModel) -> Result<(), CollabError> {
        model.scale *= self.factor;
        Ok(())
    }
}

/// `n` samples labelled 0, the first `correct` of them predicted 0.
pub fn graded(n: usize, correct: usize, loss: f64) -> StandardBatch<Graded> {
    let picks = (0..n).map(|i| usize::from(i >= correct)).collect();
    StandardBatch::new(Graded { picks, loss }, vec![0; n])
}

/// The same batch with identity coordinates and an all-visible mask.
pub fn with_coords(
    batch: &StandardBatch<Graded>,
) -> CoordinateBatch<Graded, Vec<[f64; 2]>, Vec<bool>> {
    let n = batch.len();
    CoordinateBatch::new(
        batch.input.clone(),
        vec![[0.0, 0.0]; n],
        vec![true; n],
        batch.labels.clone(),
    )
}

pub fn loader(batches: Vec<StandardBatch<Graded>>) -> InMemoryLoader<StandardBatch<Graded>> {
    InMemoryLoader::new(batches)
}
