use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::results::RunResultSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub error: Option<String>,
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub total: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub pending: u64,
    pub cancelled: bool,
    pub tasks: Vec<TaskSummary>,
}

impl RunSummary {
    pub fn from_results(
        run_id: impl Into<String>,
        started_at: impl Into<String>,
        results: &RunResultSet,
        cancelled: bool,
    ) -> Self {
        let counts = results.counts();
        Self {
            run_id: run_id.into(),
            started_at: started_at.into(),
            finished_at: now_utc_iso(),
            total: counts.total() as u64,
            succeeded: counts.succeeded as u64,
            failed: counts.failed as u64,
            pending: counts.pending as u64,
            cancelled,
            tasks: results
                .iter()
                .map(|task| TaskSummary {
                    id: task.id.clone(),
                    display_name: task.display_name.clone(),
                    status: task.status.label().to_string(),
                    error: task.error_message().map(str::to_string),
                    file: None,
                })
                .collect(),
        }
    }

    /// Records where an exported image for `task_id` was written.
    pub fn attach_file(&mut self, task_id: &str, file: impl Into<String>) {
        if let Some(task) = self.tasks.iter_mut().find(|task| task.id == task_id) {
            task.file = Some(file.into());
        }
    }
}

pub fn write_summary(
    path: &Path,
    summary: &RunSummary,
    extra: Option<&Map<String, Value>>,
) -> anyhow::Result<()> {
    let mut payload = match serde_json::to_value(summary)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("ts".to_string(), Value::String(now_utc_iso()));
    if let Some(extra) = extra {
        for (key, value) in extra {
            payload.insert(key.clone(), value.clone());
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(&Value::Object(payload))?)?;
    Ok(())
}

pub fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}
