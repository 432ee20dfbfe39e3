//! CLI subcommand handlers.

use crate::demo::data::{self, BlobSpec};
use crate::demo::{CrossEntropy, LearningRate, Sgd, SoftmaxRegression, StepDecay};
use crate::{Commands, ConfigAction, TrainArgs};
use anyhow::Context;
use fitloop_core::config::workspace_config_path;
use fitloop_core::{
    CheckpointLocation, CheckpointStore, CoordinateStep, Loader, MetricHistory, Orchestrator,
    StandardStep, StepStrategy, SvgPlotter, TrainTestHistory, TrainValTestHistory,
    TrainingConfig,
};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;

/// Handle a CLI subcommand.
pub fn handle_command(command: Commands, workspace: &Path) -> anyhow::Result<()> {
    match command {
        Commands::Train(args) => handle_train(&args, workspace),
        Commands::Inspect { dir, json } => handle_inspect(&dir, json),
        Commands::Config { action } => handle_config(action, workspace),
    }
}

/// Histories of whichever loop ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunHistory {
    TrainTest(TrainTestHistory),
    TrainValTest(TrainValTestHistory),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub strategy: &'static str,
    pub history: RunHistory,
    /// Best validation accuracy seen; only for the validation loop.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_val_accuracy: Option<f64>,
}

impl RunSummary {
    fn table(&self) -> String {
        match &self.history {
            RunHistory::TrainTest(h) => history_table(&[("train", &h.train), ("test", &h.test)]),
            RunHistory::TrainValTest(h) => history_table(&[
                ("train", &h.train),
                ("val", &h.validation),
                ("test", &h.test),
            ]),
        }
    }
}

fn handle_train(args: &TrainArgs, workspace: &Path) -> anyhow::Result<()> {
    let summary = run_training(args, workspace)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print!("{}", summary.table());
    println!("Run {} ({} strategy)", summary.run_id, summary.strategy);
    if let RunHistory::TrainValTest(h) = &summary.history
        && h.stopped_early
    {
        println!("Stopped early after {} epochs", h.epochs());
    }
    if let Some(best) = summary.best_val_accuracy {
        println!("Best validation accuracy: {best:.5}");
    }
    Ok(())
}

/// Generate the dataset, wire the demo collaborators into an orchestrator,
/// and run the loop selected by `args`.
pub fn run_training(args: &TrainArgs, workspace: &Path) -> anyhow::Result<RunSummary> {
    let overrides = args.overrides()?;
    let config = fitloop_core::load_config(Some(workspace), Some(&overrides))
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;

    let spec = BlobSpec {
        samples: args.samples,
        seed: args.seed,
        ..Default::default()
    };
    let splits = data::split(data::generate(&spec));
    tracing::info!(
        seed = spec.seed,
        train = splits.train.len(),
        validation = splits.validation.len(),
        test = splits.test.len(),
        "Generated synthetic dataset"
    );

    let lr = LearningRate::new(args.lr);
    let scheduler = StepDecay::new(lr.clone(), args.lr_step, args.lr_gamma);
    if !args.validation {
        scheduler.fast_forward(completed_epochs(&config));
    }
    let model = SoftmaxRegression::new(spec.features, spec.classes);
    let optimizer = Sgd::new(lr);

    if args.coords {
        let train = data::coordinate_loader(&splits.train, spec.features, args.batch_size)?;
        let validation =
            data::coordinate_loader(&splits.validation, spec.features, args.batch_size)?;
        let test = data::coordinate_loader(&splits.test, spec.features, args.batch_size)?;
        let orch = Orchestrator::new(model, optimizer, CrossEntropy, CoordinateStep, config)
            .with_scheduler(scheduler);
        execute(orch, "coordinate", args.validation, &train, &validation, &test)
    } else {
        let train = data::standard_loader(&splits.train, spec.features, args.batch_size)?;
        let validation = data::standard_loader(&splits.validation, spec.features, args.batch_size)?;
        let test = data::standard_loader(&splits.test, spec.features, args.batch_size)?;
        let orch = Orchestrator::new(model, optimizer, CrossEntropy, StandardStep, config)
            .with_scheduler(scheduler);
        execute(orch, "standard", args.validation, &train, &validation, &test)
    }
}

fn execute<S, D>(
    orch: Orchestrator<SoftmaxRegression, Sgd, CrossEntropy, S>,
    strategy: &'static str,
    validation_loop: bool,
    train: &D,
    validation: &D,
    test: &D,
) -> anyhow::Result<RunSummary>
where
    S: StepStrategy<SoftmaxRegression>,
    D: Loader<Batch = S::Batch>,
{
    let mut orch = if orch.config().plot {
        orch.with_plotter(SvgPlotter::default())
    } else {
        orch
    };

    if validation_loop {
        let history = orch
            .run_train_val_test(train, validation, test)
            .context("Training failed")?;
        let best_val_accuracy = (history.epochs() > 0).then(|| orch.early_stopping().best_value());
        Ok(RunSummary {
            run_id: orch.run_id().to_string(),
            strategy,
            history: RunHistory::TrainValTest(history),
            best_val_accuracy,
        })
    } else {
        let history = orch.run_train_test(train, test).context("Training failed")?;
        Ok(RunSummary {
            run_id: orch.run_id().to_string(),
            strategy,
            history: RunHistory::TrainTest(history),
            best_val_accuracy: None,
        })
    }
}

/// Epochs already recorded in the configured checkpoint. Read errors count
/// as zero here; the orchestrator reports them when it resumes.
fn completed_epochs(config: &TrainingConfig) -> usize {
    config
        .checkpoint_dir
        .as_ref()
        .and_then(|dir| {
            CheckpointStore::new(CheckpointLocation::new(dir))
                .load()
                .ok()
                .flatten()
        })
        .map_or(0, |loaded| loaded.record.epochs)
}

fn handle_inspect(dir: &Path, json: bool) -> anyhow::Result<()> {
    let store = CheckpointStore::new(CheckpointLocation::new(dir));
    let Some(loaded) = store
        .load()
        .with_context(|| format!("Failed to read checkpoint in {}", dir.display()))?
    else {
        println!("No checkpoint found in {}", dir.display());
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&loaded.record)?);
        return Ok(());
    }

    let record = &loaded.record;
    println!("Run:      {}", record.run_id);
    println!("Saved:    {}", record.saved_at.to_rfc3339());
    println!("Epochs:   {}", record.epochs);
    println!("Model:    {} bytes, sha256 {}", loaded.parameters.len(), record.model_digest);
    println!();
    print!(
        "{}",
        history_table(&[("train", &loaded.history.train), ("test", &loaded.history.test)])
    );
    Ok(())
}

fn handle_config(action: ConfigAction, workspace: &Path) -> anyhow::Result<()> {
    match action {
        ConfigAction::Init => {
            let config_path = workspace_config_path(workspace);
            if config_path.exists() {
                println!(
                    "Configuration file already exists at: {}",
                    config_path.display()
                );
                return Ok(());
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let toml_str = toml::to_string_pretty(&TrainingConfig::default())?;
            std::fs::write(&config_path, &toml_str)?;
            println!("Created default configuration at: {}", config_path.display());
            Ok(())
        }
        ConfigAction::Show => {
            let config = fitloop_core::load_config(Some(workspace), None)
                .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;
            let toml_str = toml::to_string_pretty(&config)?;
            println!("{}", toml_str);
            Ok(())
        }
    }
}

/// One row per epoch with a loss and an accuracy column for each split.
fn history_table(splits: &[(&str, &MetricHistory)]) -> String {
    let mut out = String::new();
    let _ = write!(out, "{:>5}", "epoch");
    for (name, _) in splits {
        let _ = write!(out, " {:>12} {:>12}", format!("{name} loss"), format!("{name} acc"));
    }
    out.push('\n');

    let epochs = splits.iter().map(|(_, h)| h.len()).max().unwrap_or(0);
    for epoch in 0..epochs {
        let _ = write!(out, "{:>5}", epoch + 1);
        for (_, history) in splits {
            match history.points().get(epoch) {
                Some(p) => {
                    let _ = write!(out, " {:>12.5} {:>12.5}", p.loss, p.accuracy);
                }
                None => {
                    let _ = write!(out, " {:>12} {:>12}", "-", "-");
                }
            }
        }
        out.push('\n');
    }
    out
}
