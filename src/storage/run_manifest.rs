use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "run_manifest.json";

/// Record of a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub stages: Vec<String>,
    pub outputs: Vec<PathBuf>,
}

impl RunManifest {
    pub fn start() -> Self {
        RunManifest {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            stages: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn record_stage(&mut self, stage: &str) {
        self.stages.push(stage.to_string());
    }

    pub fn finish(&mut self, outputs: &[PathBuf]) {
        self.outputs = outputs.to_vec();
        self.finished_at = Some(Utc::now());
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
