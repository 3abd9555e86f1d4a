// Performance tracing
// One JSON line per finished stage, appended to a file chosen by the caller

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::{PipelineStage, StageAccess};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Record of one stage of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// RFC 3339, UTC
    pub timestamp: String,
    pub run_id: Uuid,
    pub stage: PipelineStage,
    pub access: StageAccess,

    /// Share of the run done after this stage, 0.0 to 1.0
    pub progress: f32,

    pub message: String,

    /// Stage counters (note count, elapsed milliseconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Stamp `stage` of run `run_id` as finished now
    pub fn for_stage(run_id: Uuid, stage: PipelineStage, message: impl Into<String>) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id,
            stage,
            access: stage.access(),
            progress: stage.progress(),
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(self, data: serde_json::Value) -> Self {
        TraceEntry {
            data: Some(data),
            ..self
        }
    }
}

/// Appends [`TraceEntry`] lines to a JSONL file, creating it on first use
#[derive(Debug, Clone)]
pub struct TraceWriter {
    path: PathBuf,
}

impl TraceWriter {
    pub fn new(path: PathBuf) -> Self {
        TraceWriter { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }
}

/// Load every entry of a trace file, ignoring blank lines
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    std::fs::read_to_string(path)?
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(TraceError::from))
        .collect()
}
