//! Run configuration.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> environment -> explicit overrides. Files are
//! `~/.config/fitloop/config.toml` (platform equivalent) and
//! `.fitloop/config.toml` in the workspace.

use crate::collab::Device;
use crate::error::TrainError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one orchestrated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Total epochs, counting any resumed from a checkpoint.
    #[serde(default = "default_epochs")]
    pub epochs: usize,
    /// Divide summed loss by sample count, for every split alike.
    #[serde(default = "default_true")]
    pub normalise_loss: bool,
    /// Epochs without a strict validation improvement before stopping.
    /// Unset means never stop early.
    #[serde(default)]
    pub patience: Option<usize>,
    #[serde(default)]
    pub device: Device,
    /// Directory holding the model blob, metric record, and plots.
    #[serde(default)]
    pub checkpoint_dir: Option<PathBuf>,
    /// Render loss/accuracy plots after every epoch. Requires `checkpoint_dir`.
    #[serde(default)]
    pub plot: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            normalise_loss: true,
            patience: None,
            device: Device::Cpu,
            checkpoint_dir: None,
            plot: false,
        }
    }
}

fn default_epochs() -> usize {
    10
}

fn default_true() -> bool {
    true
}

/// Which orchestrator loop a config is used with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    /// Train + test, with optional checkpointing and plotting.
    TrainTest,
    /// Train + validation + test with early stopping; nothing persisted.
    TrainValTest,
}

impl TrainingConfig {
    /// Reject combinations the chosen loop cannot honour.
    pub fn validate_for(&self, kind: LoopKind) -> Result<(), TrainError> {
        match kind {
            LoopKind::TrainTest => {
                if self.plot && self.checkpoint_dir.is_none() {
                    return Err(TrainError::config(
                        "plotting requires checkpoint_dir: plots are written next to the checkpoint",
                    ));
                }
            }
            LoopKind::TrainValTest => {
                if self.checkpoint_dir.is_some() {
                    return Err(TrainError::config(
                        "the train/validation/test loop does not checkpoint; unset checkpoint_dir",
                    ));
                }
                if self.plot {
                    return Err(TrainError::config(
                        "the train/validation/test loop does not plot; unset plot",
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Partial config for the highest-priority layer. Only fields that are set
/// override lower layers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epochs: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalise_loss: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plot: Option<bool>,
}

/// Path of the user-level config file, if the platform has a config dir.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "fitloop", "fitloop")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".fitloop").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (prefixed with `FITLOOP_`)
/// 3. Workspace-local config (`.fitloop/config.toml`)
/// 4. User config (`~/.config/fitloop/config.toml`)
/// 5. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<TrainingConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(TrainingConfig::default()));

    if let Some(user_config) = user_config_path()
        && user_config.exists()
    {
        figment = figment.merge(Toml::file(&user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    // FITLOOP_EPOCHS, FITLOOP_CHECKPOINT_DIR, ...
    figment = figment.merge(Env::prefixed("FITLOOP_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}
