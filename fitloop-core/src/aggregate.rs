//! Full-loader passes folded into one [`MetricPoint`] per split.

use crate::collab::{Classifier, ExecutionContext, Loader, LossFn, Mode, Optimizer};
use crate::error::TrainError;
use crate::metrics::{MetricPoint, Split};
use crate::strategy::{StepOutcome, StepStrategy};

/// Running sums over one loader pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpochTotals {
    pub loss: f64,
    pub correct: usize,
    pub samples: usize,
    pub batches: usize,
}

impl EpochTotals {
    pub fn add(&mut self, step: StepOutcome) {
        self.loss += step.loss;
        self.correct += step.correct;
        self.samples += step.samples;
        self.batches += 1;
    }

    /// Reduce to a metric point.
    ///
    /// A pass with no samples yields [`MetricPoint::NO_DATA`] whatever the
    /// normalisation setting.
    pub fn finish(&self, normalise_loss: bool) -> MetricPoint {
        if self.samples == 0 {
            return MetricPoint::NO_DATA;
        }
        let total = self.samples as f64;
        let loss = if normalise_loss {
            self.loss / total
        } else {
            self.loss
        };
        MetricPoint {
            loss,
            accuracy: self.correct as f64 / total,
        }
    }
}

/// One training pass over `loader`. Switches the model to training mode first.
pub fn train_epoch<M, S, O, L, D>(
    ctx: &ExecutionContext,
    strategy: &S,
    model: &mut M,
    optimizer: &mut O,
    loss_fn: &L,
    loader: &D,
    normalise_loss: bool,
) -> Result<MetricPoint, TrainError>
where
    M: Classifier,
    S: StepStrategy<M>,
    O: Optimizer<M>,
    L: LossFn<M::Output>,
    D: Loader<Batch = S::Batch> + ?Sized,
{
    model.set_mode(Mode::Train);
    let mut totals = EpochTotals::default();
    for batch in loader.batches() {
        let batch = batch.map_err(TrainError::Loader)?;
        totals.add(strategy.train_step(ctx, model, optimizer, loss_fn, &batch)?);
    }
    tracing::debug!(
        split = %Split::Train,
        batches = totals.batches,
        samples = totals.samples,
        "Training pass complete"
    );
    Ok(totals.finish(normalise_loss))
}

/// One inference pass over `loader`. Switches the model to inference mode
/// first; parameters are only borrowed immutably during the pass.
pub fn evaluate<M, S, L, D>(
    ctx: &ExecutionContext,
    strategy: &S,
    model: &mut M,
    loss_fn: &L,
    loader: &D,
    split: Split,
    normalise_loss: bool,
) -> Result<MetricPoint, TrainError>
where
    M: Classifier,
    S: StepStrategy<M>,
    L: LossFn<M::Output>,
    D: Loader<Batch = S::Batch> + ?Sized,
{
    model.set_mode(Mode::Eval);
    let model: &M = model;
    let mut totals = EpochTotals::default();
    for batch in loader.batches() {
        let batch = batch.map_err(TrainError::Loader)?;
        totals.add(strategy.eval_step(ctx, model, loss_fn, &batch)?);
    }
    tracing::debug!(
        split = %split,
        batches = totals.batches,
        samples = totals.samples,
        "Evaluation pass complete"
    );
    Ok(totals.finish(normalise_loss))
}
