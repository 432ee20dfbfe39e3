//! Per-batch step strategies.
//!
//! A strategy knows how to unpack one batch shape and feed it to a model.
//! Everything after the forward pass (loss, arg-max, accuracy accounting) is
//! shared between variants.

use crate::batch::{CoordinateBatch, StandardBatch};
use crate::collab::{
    BatchDim, Classifier, CoordinateClassifier, ExecutionContext, LossFn, Optimizer, Scores,
};
use crate::error::TrainError;

/// Result of one step over one batch. `loss` is summed over the batch.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StepOutcome {
    pub loss: f64,
    pub correct: usize,
    pub samples: usize,
}

impl StepOutcome {
    pub const EMPTY: Self = Self {
        loss: 0.0,
        correct: 0,
        samples: 0,
    };

    fn score(loss: f64, output: &impl Scores, labels: &[usize]) -> Result<Self, TrainError> {
        if output.rows() != labels.len() {
            return Err(TrainError::batch_shape(format!(
                "model produced {} rows for {} labels",
                output.rows(),
                labels.len()
            )));
        }
        let correct = output
            .argmax()
            .iter()
            .zip(labels)
            .filter(|(predicted, label)| predicted == label)
            .count();
        Ok(Self {
            loss,
            correct,
            samples: labels.len(),
        })
    }
}

/// `{train_step, eval_step}` for one batch shape.
pub trait StepStrategy<M: Classifier> {
    type Batch;

    /// Zero gradients, forward, loss, backward, optimizer step.
    fn train_step<O, L>(
        &self,
        ctx: &ExecutionContext,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        O: Optimizer<M>,
        L: LossFn<M::Output>;

    /// Forward and loss only. The model is borrowed immutably.
    fn eval_step<L>(
        &self,
        ctx: &ExecutionContext,
        model: &M,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        L: LossFn<M::Output>;
}

fn check_dim(name: &str, dim: usize, labels: usize) -> Result<(), TrainError> {
    if dim != labels {
        return Err(TrainError::batch_shape(format!(
            "{name} has batch dimension {dim} but there are {labels} labels"
        )));
    }
    Ok(())
}

/// Strategy for `(input, labels)` batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardStep;

impl<M> StepStrategy<M> for StandardStep
where
    M: Classifier,
    M::Input: BatchDim,
{
    type Batch = StandardBatch<M::Input>;

    fn train_step<O, L>(
        &self,
        ctx: &ExecutionContext,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        O: Optimizer<M>,
        L: LossFn<M::Output>,
    {
        check_dim("input", batch.input.batch_dim(), batch.len())?;
        if batch.is_empty() {
            return Ok(StepOutcome::EMPTY);
        }

        optimizer.zero_grad(model);
        let output = model
            .forward(ctx, &batch.input)
            .map_err(TrainError::Model)?;
        let (loss, grad) = loss_fn
            .value_and_grad(ctx, &output, &batch.labels)
            .map_err(TrainError::Loss)?;
        let outcome = StepOutcome::score(loss, &output, &batch.labels)?;
        model
            .backward(ctx, &batch.input, &grad)
            .map_err(TrainError::Model)?;
        optimizer.step(ctx, model).map_err(TrainError::Optimizer)?;
        Ok(outcome)
    }

    fn eval_step<L>(
        &self,
        ctx: &ExecutionContext,
        model: &M,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        L: LossFn<M::Output>,
    {
        check_dim("input", batch.input.batch_dim(), batch.len())?;
        if batch.is_empty() {
            return Ok(StepOutcome::EMPTY);
        }

        let output = model
            .forward(ctx, &batch.input)
            .map_err(TrainError::Model)?;
        let loss = loss_fn
            .value(ctx, &output, &batch.labels)
            .map_err(TrainError::Loss)?;
        StepOutcome::score(loss, &output, &batch.labels)
    }
}

/// Strategy for `(input, coords, mask, labels)` batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateStep;

impl CoordinateStep {
    fn check<X, C, K>(batch: &CoordinateBatch<X, C, K>) -> Result<(), TrainError>
    where
        X: BatchDim,
        C: BatchDim,
        K: BatchDim,
    {
        let n = batch.len();
        check_dim("input", batch.input.batch_dim(), n)?;
        check_dim("coords", batch.coords.batch_dim(), n)?;
        check_dim("mask", batch.mask.batch_dim(), n)
    }
}

impl<M> StepStrategy<M> for CoordinateStep
where
    M: CoordinateClassifier,
    M::Input: BatchDim,
    M::Coords: BatchDim,
    M::Mask: BatchDim,
{
    type Batch = CoordinateBatch<M::Input, M::Coords, M::Mask>;

    fn train_step<O, L>(
        &self,
        ctx: &ExecutionContext,
        model: &mut M,
        optimizer: &mut O,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        O: Optimizer<M>,
        L: LossFn<M::Output>,
    {
        Self::check(batch)?;
        if batch.is_empty() {
            return Ok(StepOutcome::EMPTY);
        }

        optimizer.zero_grad(model);
        let output = model
            .forward_with_coords(ctx, &batch.input, &batch.coords, &batch.mask)
            .map_err(TrainError::Model)?;
        let (loss, grad) = loss_fn
            .value_and_grad(ctx, &output, &batch.labels)
            .map_err(TrainError::Loss)?;
        let outcome = StepOutcome::score(loss, &output, &batch.labels)?;
        model
            .backward_with_coords(ctx, &batch.input, &batch.coords, &batch.mask, &grad)
            .map_err(TrainError::Model)?;
        optimizer.step(ctx, model).map_err(TrainError::Optimizer)?;
        Ok(outcome)
    }

    fn eval_step<L>(
        &self,
        ctx: &ExecutionContext,
        model: &M,
        loss_fn: &L,
        batch: &Self::Batch,
    ) -> Result<StepOutcome, TrainError>
    where
        L: LossFn<M::Output>,
    {
        Self::check(batch)?;
        if batch.is_empty() {
            return Ok(StepOutcome::EMPTY);
        }

        let output = model
            .forward_with_coords(ctx, &batch.input, &batch.coords, &batch.mask)
            .map_err(TrainError::Model)?;
        let loss = loss_fn
            .value(ctx, &output, &batch.labels)
            .map_err(TrainError::Loss)?;
        StepOutcome::score(loss, &output, &batch.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{
        CountingOptimizer, ScriptedLoss, ScriptedModel, batch, coord_batch, graded_batch,
    };

    #[test]
    fn test_train_step_counts_and_updates() {
        let ctx = ExecutionContext::default();
        let mut model = ScriptedModel::default();
        let mut opt = CountingOptimizer::default();

        let outcome = StandardStep
            .train_step(&ctx, &mut model, &mut opt, &ScriptedLoss, &graded_batch(4, 2, 2.0))
            .unwrap();

        assert_eq!(
            outcome,
            StepOutcome {
                loss: 2.0,
                correct: 2,
                samples: 4
            }
        );
        assert_eq!(opt.zero_grads, 1);
        assert_eq!(opt.steps, 1);
        assert_eq!(model.backward_calls, 1);
        assert_eq!(model.steps, 1);
    }

    #[test]
    fn test_eval_step_leaves_model_untouched() {
        let ctx = ExecutionContext::default();
        let model = ScriptedModel::default();
        let outcome = StandardStep
            .eval_step(&ctx, &model, &ScriptedLoss, &graded_batch(4, 3, 1.0))
            .unwrap();
        assert_eq!(outcome.correct, 3);
        assert_eq!(model.steps, 0);
        assert_eq!(model.backward_calls, 0);
    }

    #[test]
    fn test_empty_batch_contributes_nothing() {
        let ctx = ExecutionContext::default();
        let mut model = ScriptedModel::default();
        let mut opt = CountingOptimizer::default();
        let outcome = StandardStep
            .train_step(&ctx, &mut model, &mut opt, &ScriptedLoss, &batch(vec![], vec![], 5.0))
            .unwrap();
        assert_eq!(outcome, StepOutcome::EMPTY);
        assert_eq!(opt.zero_grads, 0);
        assert_eq!(opt.steps, 0);
    }

    #[test]
    fn test_mismatched_batch_dim_is_rejected() {
        let ctx = ExecutionContext::default();
        let model = ScriptedModel::default();
        let err = StandardStep
            .eval_step(&ctx, &model, &ScriptedLoss, &batch(vec![0, 1], vec![0], 1.0))
            .unwrap_err();
        assert!(matches!(err, TrainError::BatchShape(_)));

        let mut bad = coord_batch(vec![0, 1], vec![0, 1], 1.0);
        bad.mask.pop();
        let err = CoordinateStep
            .eval_step(&ctx, &model, &ScriptedLoss, &bad)
            .unwrap_err();
        assert!(err.to_string().contains("mask"));
    }

    #[test]
    fn test_model_failure_propagates() {
        let ctx = ExecutionContext::default();
        let model = ScriptedModel {
            fail_forward: true,
            ..Default::default()
        };
        let err = StandardStep
            .eval_step(&ctx, &model, &ScriptedLoss, &graded_batch(2, 1, 1.0))
            .unwrap_err();
        assert!(matches!(err, TrainError::Model(_)));
        assert!(err.to_string().contains("forward exploded"));
    }

    #[test]
    fn test_coordinate_step_matches_standard() {
        let ctx = ExecutionContext::default();
        let mut a = ScriptedModel::default();
        let mut b = ScriptedModel::default();
        let mut opt_a = CountingOptimizer::default();
        let mut opt_b = CountingOptimizer::default();

        let plain = batch(vec![0, 1, 1], vec![0, 1, 0], 0.9);
        let with_coords = coord_batch(vec![0, 1, 1], vec![0, 1, 0], 0.9);
        let std_out = StandardStep
            .train_step(&ctx, &mut a, &mut opt_a, &ScriptedLoss, &plain)
            .unwrap();
        let coord_out = CoordinateStep
            .train_step(&ctx, &mut b, &mut opt_b, &ScriptedLoss, &with_coords)
            .unwrap();

        assert_eq!(std_out, coord_out);
        assert_eq!(a.steps, b.steps);
    }
}
