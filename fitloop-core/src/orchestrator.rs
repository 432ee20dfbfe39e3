//! The epoch loop.
//!
//! Two entry points share one epoch routine:
//!
//! - [`Orchestrator::run_train_test`]: train + test, resumable from a
//!   checkpoint directory, optionally plotting after each epoch.
//! - [`Orchestrator::run_train_val_test`]: train + validation + test with
//!   early stopping on validation accuracy; nothing is persisted.

use crate::aggregate;
use crate::checkpoint::{CheckpointLocation, CheckpointStore};
use crate::collab::{Classifier, ExecutionContext, Loader, LossFn, Optimizer, Plotter, Scheduler};
use crate::config::{LoopKind, TrainingConfig};
use crate::early_stopping::EarlyStopping;
use crate::error::{CheckpointError, TrainError};
use crate::metrics::{MetricPoint, Split, TrainTestHistory, TrainValTestHistory};
use crate::strategy::StepStrategy;
use std::time::{Duration, Instant};
use uuid::Uuid;

const LOSS_PLOT: &str = "loss.svg";
const ACCURACY_PLOT: &str = "accuracy.svg";

/// Metrics for one epoch, in the order the eval loaders were given.
#[derive(Debug, Clone)]
struct EpochReport {
    train: MetricPoint,
    evals: Vec<MetricPoint>,
    elapsed: Duration,
}

impl EpochReport {
    fn eval(&self, idx: usize) -> MetricPoint {
        self.evals.get(idx).copied().unwrap_or(MetricPoint::NO_DATA)
    }
}

/// Drives epochs over caller-supplied collaborators.
///
/// The step strategy `S` decides which batch shape the loaders yield and how
/// it reaches the model.
pub struct Orchestrator<M, O, L, S>
where
    M: Classifier,
    S: StepStrategy<M>,
{
    ctx: ExecutionContext,
    model: M,
    optimizer: O,
    loss_fn: L,
    strategy: S,
    config: TrainingConfig,
    scheduler: Option<Box<dyn Scheduler>>,
    plotter: Option<Box<dyn Plotter>>,
    early_stopping: EarlyStopping,
    run_id: Uuid,
}

impl<M, O, L, S> Orchestrator<M, O, L, S>
where
    M: Classifier,
    O: Optimizer<M>,
    L: LossFn<M::Output>,
    S: StepStrategy<M>,
{
    /// The execution context is derived from `config.device`.
    pub fn new(model: M, optimizer: O, loss_fn: L, strategy: S, config: TrainingConfig) -> Self {
        Self {
            ctx: ExecutionContext::new(config.device),
            model,
            optimizer,
            loss_fn,
            strategy,
            early_stopping: EarlyStopping::new(config.patience),
            config,
            scheduler: None,
            plotter: None,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Box::new(scheduler));
        self
    }

    /// Plotting also requires `config.checkpoint_dir`; this is checked when a
    /// loop starts.
    pub fn with_plotter(mut self, plotter: impl Plotter + 'static) -> Self {
        self.plotter = Some(Box::new(plotter));
        self
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.ctx
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    /// Identifier written into checkpoint records; adopted from the record on resume.
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Train and test for `config.epochs` epochs in total, resuming from
    /// `config.checkpoint_dir` when it holds a previous run.
    pub fn run_train_test<TR, TE>(
        &mut self,
        train: &TR,
        test: &TE,
    ) -> Result<TrainTestHistory, TrainError>
    where
        TR: Loader<Batch = S::Batch>,
        TE: Loader<Batch = S::Batch>,
    {
        self.config.validate_for(LoopKind::TrainTest)?;
        if self.config.plot && self.plotter.is_none() {
            return Err(TrainError::config("plotting enabled but no plotter was supplied"));
        }

        let store = self
            .config
            .checkpoint_dir
            .as_ref()
            .map(|dir| CheckpointStore::new(CheckpointLocation::new(dir)));
        let mut history = match &store {
            Some(store) => self.resume(store)?,
            None => TrainTestHistory::default(),
        };

        let first = history.epochs() + 1;
        if first > self.config.epochs {
            tracing::info!(
                completed = history.epochs(),
                epochs = self.config.epochs,
                "Checkpoint already covers the requested epochs"
            );
        }

        for epoch in first..=self.config.epochs {
            let report = self.run_epoch(
                epoch,
                train,
                &[(Split::Test, test as &dyn Loader<Batch = S::Batch>)],
            )?;
            self.step_scheduler(epoch, report.train.loss)?;

            let test_point = report.eval(0);
            tracing::info!(
                run_id = %self.run_id,
                epoch,
                train_loss = report.train.loss,
                train_accuracy = report.train.accuracy,
                test_loss = test_point.loss,
                test_accuracy = test_point.accuracy,
                "Epoch {epoch:03}: train loss {:.5}, train accuracy {:.5}, test accuracy {:.5}, time {}s",
                report.train.loss,
                report.train.accuracy,
                test_point.accuracy,
                report.elapsed.as_secs()
            );
            history.train.push(report.train);
            history.test.push(test_point);

            if let Some(store) = &store {
                let parameters = self.model.save_parameters().map_err(TrainError::Model)?;
                store.save(self.run_id, &parameters, &history)?;
                self.plot(store.location(), &history)?;
            }
        }

        Ok(history)
    }

    /// Train, validate, and test for up to `config.epochs` epochs, stopping
    /// before an epoch once validation accuracy has stalled for
    /// `config.patience` epochs. Test metrics are reported only.
    pub fn run_train_val_test<TR, VA, TE>(
        &mut self,
        train: &TR,
        validation: &VA,
        test: &TE,
    ) -> Result<TrainValTestHistory, TrainError>
    where
        TR: Loader<Batch = S::Batch>,
        VA: Loader<Batch = S::Batch>,
        TE: Loader<Batch = S::Batch>,
    {
        self.config.validate_for(LoopKind::TrainValTest)?;

        let mut history = TrainValTestHistory::default();
        for epoch in 1..=self.config.epochs {
            if self.early_stopping.should_stop() {
                tracing::warn!(
                    epoch,
                    best_val_accuracy = self.early_stopping.best_value(),
                    stall_count = self.early_stopping.stall_count(),
                    "Early stopping"
                );
                history.stopped_early = true;
                break;
            }

            let report = self.run_epoch(
                epoch,
                train,
                &[
                    (Split::Validation, validation as &dyn Loader<Batch = S::Batch>),
                    (Split::Test, test as &dyn Loader<Batch = S::Batch>),
                ],
            )?;
            let val_point = report.eval(0);
            let test_point = report.eval(1);
            let improved = self.early_stopping.update(val_point.accuracy);
            self.step_scheduler(epoch, report.train.loss)?;

            tracing::info!(
                epoch,
                train_loss = report.train.loss,
                train_accuracy = report.train.accuracy,
                val_loss = val_point.loss,
                val_accuracy = val_point.accuracy,
                test_loss = test_point.loss,
                test_accuracy = test_point.accuracy,
                improved,
                "Epoch {epoch:03}: train loss {:.5}, train accuracy {:.5}, val loss {:.5}, val accuracy {:.5}, test loss {:.5}, test accuracy {:.5}, time {}s{}",
                report.train.loss,
                report.train.accuracy,
                val_point.loss,
                val_point.accuracy,
                test_point.loss,
                test_point.accuracy,
                report.elapsed.as_secs(),
                if improved { " NEW" } else { "" }
            );
            history.train.push(report.train);
            history.validation.push(val_point);
            history.test.push(test_point);
        }

        Ok(history)
    }

    /// Load a previous run into the model and return its history.
    fn resume(&mut self, store: &CheckpointStore) -> Result<TrainTestHistory, TrainError> {
        store.prepare()?;
        let Some(loaded) = store.load()? else {
            return Ok(TrainTestHistory::default());
        };
        self.model
            .load_parameters(&loaded.parameters)
            .map_err(|e| {
                CheckpointError::corrupt(
                    store.location().dir(),
                    format!("model rejected stored parameters: {e}"),
                )
            })?;
        self.run_id = loaded.record.run_id;
        tracing::info!(
            run_id = %self.run_id,
            dir = %store.location().dir().display(),
            completed = loaded.history.epochs(),
            "Resuming from checkpoint"
        );
        Ok(loaded.history)
    }

    /// One training pass followed by one evaluation pass per entry in `evals`.
    fn run_epoch(
        &mut self,
        epoch: usize,
        train: &dyn Loader<Batch = S::Batch>,
        evals: &[(Split, &dyn Loader<Batch = S::Batch>)],
    ) -> Result<EpochReport, TrainError> {
        let started = Instant::now();
        let normalise = self.config.normalise_loss;
        tracing::debug!(epoch, "Starting epoch");

        let train = aggregate::train_epoch(
            &self.ctx,
            &self.strategy,
            &mut self.model,
            &mut self.optimizer,
            &self.loss_fn,
            train,
            normalise,
        )?;
        let evals = evals
            .iter()
            .map(|(split, loader)| {
                aggregate::evaluate(
                    &self.ctx,
                    &self.strategy,
                    &mut self.model,
                    &self.loss_fn,
                    *loader,
                    *split,
                    normalise,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EpochReport {
            train,
            evals,
            elapsed: started.elapsed(),
        })
    }

    fn step_scheduler(&mut self, epoch: usize, train_loss: f64) -> Result<(), TrainError> {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler
                .step(&self.ctx, epoch, train_loss)
                .map_err(TrainError::Scheduler)?;
        }
        Ok(())
    }

    fn plot(
        &mut self,
        location: &CheckpointLocation,
        history: &TrainTestHistory,
    ) -> Result<(), TrainError> {
        if !self.config.plot {
            return Ok(());
        }
        let Some(plotter) = self.plotter.as_mut() else {
            return Ok(());
        };
        let x: Vec<usize> = (1..=history.epochs()).collect();
        plotter
            .render(
                &x,
                &history.train.losses(),
                &history.test.losses(),
                "Loss",
                &location.artifact_path(LOSS_PLOT),
            )
            .map_err(TrainError::Plot)?;
        plotter
            .render(
                &x,
                &history.train.accuracies(),
                &history.test.accuracies(),
                "Classification accuracy",
                &location.artifact_path(ACCURACY_PLOT),
            )
            .map_err(TrainError::Plot)?;
        Ok(())
    }
}
