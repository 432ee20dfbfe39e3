//! Checkpoint storage for resumable training runs.
//!
//! A checkpoint is two artifacts in one directory: an opaque model-parameter
//! blob and a versioned JSON record of the metric histories. The record
//! carries the SHA-256 of the blob written in the same epoch, so a blob and a
//! record from different epochs are detected on load instead of silently
//! resumed.

use crate::error::CheckpointError;
use crate::metrics::{MetricHistory, TrainTestHistory};
use crate::persistence::{self, float_seq};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current layout of [`CheckpointRecord`].
pub const RECORD_VERSION: u32 = 1;

const DEFAULT_MODEL_FILE: &str = "model.bin";
const DEFAULT_METRICS_FILE: &str = "metrics.json";

/// Directory plus logical artifact names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointLocation {
    dir: PathBuf,
    model_file: String,
    metrics_file: String,
}

impl CheckpointLocation {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            model_file: DEFAULT_MODEL_FILE.to_string(),
            metrics_file: DEFAULT_METRICS_FILE.to_string(),
        }
    }

    pub fn with_artifact_names(
        mut self,
        model_file: impl Into<String>,
        metrics_file: impl Into<String>,
    ) -> Self {
        self.model_file = model_file.into();
        self.metrics_file = metrics_file.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model_path(&self) -> PathBuf {
        self.dir.join(&self.model_file)
    }

    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(&self.metrics_file)
    }

    /// Path for any other per-run artifact (plots) in the same directory.
    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }
}

/// Versioned metric record written next to the model blob every epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub version: u32,
    /// Stable across resumes of the same run.
    pub run_id: Uuid,
    pub saved_at: DateTime<Utc>,
    pub epochs: usize,
    /// Hex SHA-256 of the model blob saved alongside this record.
    pub model_digest: String,
    #[serde(with = "float_seq")]
    pub train_accs: Vec<f64>,
    #[serde(with = "float_seq")]
    pub test_accs: Vec<f64>,
    #[serde(with = "float_seq")]
    pub train_losses: Vec<f64>,
    #[serde(with = "float_seq")]
    pub test_losses: Vec<f64>,
}

impl CheckpointRecord {
    pub fn new(run_id: Uuid, parameters: &[u8], history: &TrainTestHistory) -> Self {
        Self {
            version: RECORD_VERSION,
            run_id,
            saved_at: Utc::now(),
            epochs: history.epochs(),
            model_digest: digest(parameters),
            train_accs: history.train.accuracies(),
            test_accs: history.test.accuracies(),
            train_losses: history.train.losses(),
            test_losses: history.test.losses(),
        }
    }

    /// Rebuild the in-memory histories, checking every column has `epochs`
    /// entries.
    pub fn history(&self) -> Result<TrainTestHistory, String> {
        let columns = [
            ("train_accs", self.train_accs.len()),
            ("test_accs", self.test_accs.len()),
            ("train_losses", self.train_losses.len()),
            ("test_losses", self.test_losses.len()),
        ];
        if let Some((name, len)) = columns.iter().find(|(_, len)| *len != self.epochs) {
            return Err(format!(
                "record claims {} epochs but {name} has {len} entries",
                self.epochs
            ));
        }
        let train = MetricHistory::from_columns(&self.train_losses, &self.train_accs);
        let test = MetricHistory::from_columns(&self.test_losses, &self.test_accs);
        match (train, test) {
            (Some(train), Some(test)) => Ok(TrainTestHistory { train, test }),
            _ => Err("history columns have different lengths".to_string()),
        }
    }
}

/// A checkpoint read back from disk and validated.
#[derive(Debug, Clone)]
pub struct LoadedCheckpoint {
    pub record: CheckpointRecord,
    pub parameters: Vec<u8>,
    pub history: TrainTestHistory,
}

/// Hex SHA-256 of a parameter blob.
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Reads and writes one [`CheckpointLocation`].
///
/// There is no locking: two runs pointed at the same location overwrite each
/// other.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    location: CheckpointLocation,
}

impl CheckpointStore {
    pub fn new(location: CheckpointLocation) -> Self {
        Self { location }
    }

    pub fn location(&self) -> &CheckpointLocation {
        &self.location
    }

    /// Create the checkpoint directory if it doesn't exist.
    pub fn prepare(&self) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(self.location.dir())?;
        Ok(())
    }

    /// Load a previous run, if any.
    ///
    /// `Ok(None)` when neither artifact exists. Any other combination that
    /// cannot be resumed is [`CheckpointError::Corrupt`].
    pub fn load(&self) -> Result<Option<LoadedCheckpoint>, CheckpointError> {
        let dir = self.location.dir();
        let model_path = self.location.model_path();
        let metrics_path = self.location.metrics_path();

        match (model_path.exists(), metrics_path.exists()) {
            (false, false) => return Ok(None),
            (true, false) => {
                return Err(CheckpointError::corrupt(
                    dir,
                    "model parameters present but metric history missing",
                ));
            }
            (false, true) => {
                return Err(CheckpointError::corrupt(
                    dir,
                    "metric history present but model parameters missing",
                ));
            }
            (true, true) => {}
        }

        let parameters = std::fs::read(&model_path)?;
        let record: CheckpointRecord = persistence::load_json(&metrics_path)
            .map_err(|e| CheckpointError::corrupt(dir, format!("unreadable metric history: {e}")))?
            .ok_or_else(|| {
                CheckpointError::corrupt(dir, "metric history disappeared while loading")
            })?;

        if record.version != RECORD_VERSION {
            return Err(CheckpointError::corrupt(
                dir,
                format!(
                    "unsupported record version {} (expected {RECORD_VERSION})",
                    record.version
                ),
            ));
        }
        let history = record
            .history()
            .map_err(|reason| CheckpointError::corrupt(dir, reason))?;
        let actual = digest(&parameters);
        if actual != record.model_digest {
            return Err(CheckpointError::corrupt(
                dir,
                format!(
                    "model parameters (sha256 {actual}) do not match the metric record (sha256 {})",
                    record.model_digest
                ),
            ));
        }

        tracing::debug!(
            dir = %dir.display(),
            epochs = record.epochs,
            run_id = %record.run_id,
            "Loaded checkpoint"
        );
        Ok(Some(LoadedCheckpoint {
            record,
            parameters,
            history,
        }))
    }

    /// Overwrite both artifacts. The blob is written first so an interrupted
    /// save leaves a digest mismatch rather than a stale-but-valid pair.
    pub fn save(
        &self,
        run_id: Uuid,
        parameters: &[u8],
        history: &TrainTestHistory,
    ) -> Result<CheckpointRecord, CheckpointError> {
        let record = CheckpointRecord::new(run_id, parameters, history);
        persistence::atomic_write(&self.location.model_path(), parameters)?;
        persistence::atomic_write_json(&self.location.metrics_path(), &record)?;
        tracing::debug!(
            dir = %self.location.dir().display(),
            epochs = record.epochs,
            bytes = parameters.len(),
            "Saved checkpoint"
        );
        Ok(record)
    }
}
