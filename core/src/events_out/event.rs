use chrono::Local;
use serde::Serialize;

use super::EventsOutTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Succeeded,
    Failed,
    Skipped,
}

/// One line of the events stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum RunEvent {
    #[serde(rename = "run.start")]
    RunStart {
        run_id: String,
        ts: String,
        total: usize,
        skipped: usize,
        workers: usize,
        platform: String,
    },
    #[serde(rename = "task.start")]
    TaskStart {
        run_id: String,
        ts: String,
        task_id: usize,
        label: String,
        alone: bool,
        cost_in_flight: i64,
    },
    #[serde(rename = "task.end")]
    TaskEnd {
        run_id: String,
        ts: String,
        task_id: usize,
        label: String,
        status: TaskStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        elapsed_ms: u64,
        completed: usize,
        total: usize,
        cost_in_flight: i64,
    },
    #[serde(rename = "run.end")]
    RunEnd {
        run_id: String,
        ts: String,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        elapsed_ms: u64,
        ok: bool,
    },
}

impl RunEvent {
    pub fn now() -> String {
        Local::now().to_rfc3339()
    }
}

pub async fn write_event(out: Option<&EventsOutTx>, ev: &RunEvent) {
    let Some(out) = out else {
        return;
    };
    match serde_json::to_string(ev) {
        Ok(line) => out.send_line(line).await,
        Err(e) => tracing::warn!(error = %e, "failed to encode run event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_events_by_type() {
        let ev = RunEvent::TaskEnd {
            run_id: "r".into(),
            ts: "t".into(),
            task_id: 2,
            label: "Core".into(),
            status: TaskStatus::Failed,
            error: Some("exit status 65".into()),
            elapsed_ms: 1500,
            completed: 3,
            total: 4,
            cost_in_flight: 0,
        };
        let v: serde_json::Value = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "task.end");
        assert_eq!(v["status"], "failed");
        assert_eq!(v["error"], "exit status 65");
    }

    #[test]
    fn omits_missing_error() {
        let ev = RunEvent::TaskEnd {
            run_id: "r".into(),
            ts: "t".into(),
            task_id: 0,
            label: "A".into(),
            status: TaskStatus::Succeeded,
            error: None,
            elapsed_ms: 1,
            completed: 1,
            total: 1,
            cost_in_flight: 0,
        };
        let line = serde_json::to_string(&ev).unwrap();
        assert!(!line.contains("\"error\""));
    }
}
