//! Deterministic collaborators for unit tests.

use crate::batch::{CoordinateBatch, StandardBatch};
use crate::collab::{
    BatchDim, Classifier, CollabError, CoordinateClassifier, ExecutionContext, LossFn, Mode,
    Optimizer, Scores,
};

/// Input carrying the class each sample will be predicted as and the batch's
/// summed loss before any training.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedInput {
    pub picks: Vec<usize>,
    pub loss: f64,
}

impl BatchDim for ScriptedInput {
    fn batch_dim(&self) -> usize {
        self.picks.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedOutput {
    pub picks: Vec<usize>,
    pub loss: f64,
}

impl Scores for ScriptedOutput {
    fn rows(&self) -> usize {
        self.picks.len()
    }

    fn argmax(&self) -> Vec<usize> {
        self.picks.clone()
    }
}

/// Model whose loss shrinks as `1 / (1 + steps)` with each optimizer step.
#[derive(Debug, Default)]
pub struct ScriptedModel {
    pub mode: Mode,
    pub steps: u64,
    pub backward_calls: usize,
    pub fail_forward: bool,
}

impl Classifier for ScriptedModel {
    type Input = ScriptedInput;
    type Output = ScriptedOutput;

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(
        &self,
        _ctx: &ExecutionContext,
        input: &ScriptedInput,
    ) -> Result<ScriptedOutput, CollabError> {
        if self.fail_forward {
            return Err("forward exploded".into());
        }
        Ok(ScriptedOutput {
            picks: input.picks.clone(),
            loss: input.loss / (1.0 + self.steps as f64),
        })
    }

    fn backward(
        &mut self,
        _ctx: &ExecutionContext,
        _input: &ScriptedInput,
        _output_grad: &ScriptedOutput,
    ) -> Result<(), CollabError> {
        self.backward_calls += 1;
        Ok(())
    }

    fn save_parameters(&self) -> Result<Vec<u8>, CollabError> {
        Ok(self.steps.to_le_bytes().to_vec())
    }

    fn load_parameters(&mut self, blob: &[u8]) -> Result<(), CollabError> {
        let bytes: [u8; 8] = blob.try_into().map_err(|_| "expected 8 parameter bytes")?;
        self.steps = u64::from_le_bytes(bytes);
        Ok(())
    }
}

impl CoordinateClassifier for ScriptedModel {
    type Coords = Vec<f64>;
    type Mask = Vec<bool>;

    fn forward_with_coords(
        &self,
        ctx: &ExecutionContext,
        input: &ScriptedInput,
        _coords: &Vec<f64>,
        _mask: &Vec<bool>,
    ) -> Result<ScriptedOutput, CollabError> {
        self.forward(ctx, input)
    }

    fn backward_with_coords(
        &mut self,
        ctx: &ExecutionContext,
        input: &ScriptedInput,
        _coords: &Vec<f64>,
        _mask: &Vec<bool>,
        output_grad: &ScriptedOutput,
    ) -> Result<(), CollabError> {
        self.backward(ctx, input, output_grad)
    }
}

/// Loss that reports whatever the scripted output carries.
#[derive(Debug, Default)]
pub struct ScriptedLoss;

impl LossFn<ScriptedOutput> for ScriptedLoss {
    fn value(
        &self,
        _ctx: &ExecutionContext,
        output: &ScriptedOutput,
        _labels: &[usize],
    ) -> Result<f64, CollabError> {
        Ok(output.loss)
    }

    fn value_and_grad(
        &self,
        _ctx: &ExecutionContext,
        output: &ScriptedOutput,
        _labels: &[usize],
    ) -> Result<(f64, ScriptedOutput), CollabError> {
        Ok((output.loss, output.clone()))
    }
}

#[derive(Debug, Default)]
pub struct CountingOptimizer {
    pub zero_grads: usize,
    pub steps: usize,
}

impl Optimizer<ScriptedModel> for CountingOptimizer {
    fn zero_grad(&mut self, _model: &mut ScriptedModel) {
        self.zero_grads += 1;
    }

    fn step(
        &mut self,
        _ctx: &ExecutionContext,
        model: &mut ScriptedModel,
    ) -> Result<(), CollabError> {
        self.steps += 1;
        model.steps += 1;
        Ok(())
    }
}

pub fn batch(picks: Vec<usize>, labels: Vec<usize>, loss: f64) -> StandardBatch<ScriptedInput> {
    StandardBatch::new(ScriptedInput { picks, loss }, labels)
}

pub fn coord_batch(
    picks: Vec<usize>,
    labels: Vec<usize>,
    loss: f64,
) -> CoordinateBatch<ScriptedInput, Vec<f64>, Vec<bool>> {
    let n = labels.len();
    CoordinateBatch::new(ScriptedInput { picks, loss }, vec![0.0; n], vec![true; n], labels)
}

/// A batch of `n` samples of which the first `correct` are predicted right.
pub fn graded_batch(n: usize, correct: usize, loss: f64) -> StandardBatch<ScriptedInput> {
    let labels = vec![0; n];
    let picks = (0..n).map(|i| if i < correct { 0 } else { 1 }).collect();
    batch(picks, labels, loss)
}
