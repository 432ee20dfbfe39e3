//! Plain SGD and a step-decay learning-rate schedule.
//!
//! The optimizer and the scheduler share one learning-rate cell: the
//! orchestrator owns both but only ever hands the optimizer to step
//! strategies.

use super::model::SoftmaxRegression;
use fitloop_core::{CollabError, ExecutionContext, Optimizer, Scheduler};
use std::cell::Cell;
use std::rc::Rc;

/// Learning rate shared between [`Sgd`] and [`StepDecay`].
#[derive(Debug, Clone)]
pub struct LearningRate(Rc<Cell<f64>>);

impl LearningRate {
    pub fn new(value: f64) -> Self {
        Self(Rc::new(Cell::new(value)))
    }

    pub fn get(&self) -> f64 {
        self.0.get()
    }

    fn set(&self, value: f64) {
        self.0.set(value);
    }
}

#[derive(Debug, Clone)]
pub struct Sgd {
    lr: LearningRate,
}

impl Sgd {
    pub fn new(lr: LearningRate) -> Self {
        Self { lr }
    }
}

impl Optimizer<SoftmaxRegression> for Sgd {
    fn zero_grad(&mut self, model: &mut SoftmaxRegression) {
        model.zero_grad();
    }

    fn step(
        &mut self,
        _ctx: &ExecutionContext,
        model: &mut SoftmaxRegression,
    ) -> Result<(), CollabError> {
        let lr = self.lr.get();
        if !lr.is_finite() || lr < 0.0 {
            return Err(format!("invalid learning rate {lr}").into());
        }
        model.apply_gradients(lr);
        Ok(())
    }
}

/// Multiply the learning rate by `gamma` after every `step_size` epochs.
///
/// The rate after epoch `e` is `base * gamma^(e / step_size)`, so a run
/// resumed from a checkpoint lands on the same curve.
#[derive(Debug, Clone)]
pub struct StepDecay {
    lr: LearningRate,
    base: f64,
    step_size: usize,
    gamma: f64,
}

impl StepDecay {
    /// The current value of `lr` becomes the base rate.
    pub fn new(lr: LearningRate, step_size: usize, gamma: f64) -> Self {
        Self {
            base: lr.get(),
            lr,
            step_size: step_size.max(1),
            gamma,
        }
    }

    pub fn rate_after(&self, epoch: usize) -> f64 {
        let decays = i32::try_from(epoch / self.step_size).unwrap_or(i32::MAX);
        self.base * self.gamma.powi(decays)
    }

    /// Set the rate as if `completed` epochs had already run.
    pub fn fast_forward(&self, completed: usize) {
        self.lr.set(self.rate_after(completed));
    }
}

impl Scheduler for StepDecay {
    fn step(
        &mut self,
        _ctx: &ExecutionContext,
        epoch: usize,
        metric: f64,
    ) -> Result<(), CollabError> {
        let next = self.rate_after(epoch);
        if next != self.lr.get() {
            tracing::debug!(epoch, metric, lr = next, "Decayed learning rate");
        }
        self.lr.set(next);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decay_is_keyed_on_epoch_number() {
        let lr = LearningRate::new(1.0);
        let mut sched = StepDecay::new(lr.clone(), 2, 0.5);
        let ctx = ExecutionContext::default();
        sched.step(&ctx, 1, 0.0).unwrap();
        assert_eq!(lr.get(), 1.0);
        for epoch in 2..=5 {
            sched.step(&ctx, epoch, 0.0).unwrap();
        }
        assert_eq!(lr.get(), 0.25);

        // A run resumed after epoch 3 starts from the rate epoch 3 left behind.
        let resumed = LearningRate::new(1.0);
        let sched = StepDecay::new(resumed.clone(), 2, 0.5);
        sched.fast_forward(3);
        assert_eq!(resumed.get(), 0.5);
        assert_eq!(sched.rate_after(0), 1.0);
    }

    #[test]
    fn test_sgd_reads_shared_rate() {
        let lr = LearningRate::new(0.0);
        let mut sgd = Sgd::new(lr.clone());
        let mut model = SoftmaxRegression::new(1, 2);
        let ctx = ExecutionContext::default();
        assert!(sgd.step(&ctx, &mut model).is_ok());

        lr.set(f64::NAN);
        assert!(sgd.step(&ctx, &mut model).is_err());
    }
}
