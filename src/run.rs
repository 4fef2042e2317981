use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ClaError, ErrorKind};
use crate::pipeline::{Decision, Outcome};

/// Represents the status of a pipeline run
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "running" => Some(RunStatus::Running),
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One webhook delivery processed by the pipeline
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub id: String,
    pub pull_request: Option<String>,
    pub action: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub decision: Option<Decision>,
    pub error_kind: Option<ErrorKind>,
    pub error: Option<String>,
}

impl RunRecord {
    /// Create a new run in Running status
    pub fn new(pull_request: Option<String>, action: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            pull_request,
            action,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            message: None,
            decision: None,
            error_kind: None,
            error: None,
        }
    }

    pub fn mark_succeeded(&mut self, outcome: &Outcome) {
        self.status = RunStatus::Succeeded;
        self.completed_at = Some(Utc::now());
        self.message = Some(outcome.message.clone());
        self.decision = Some(outcome.decision.clone());
    }

    pub fn mark_failed(&mut self, error: &ClaError) {
        self.status = RunStatus::Failed;
        self.completed_at = Some(Utc::now());
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct RunCounts {
    pub running: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Bounded history of recent runs; the oldest record is evicted first
pub struct RunStore {
    runs: VecDeque<RunRecord>,
    max_runs: usize,
}

impl RunStore {
    pub fn new(max_runs: usize) -> Self {
        Self {
            runs: VecDeque::with_capacity(max_runs),
            max_runs,
        }
    }

    pub fn add_run(&mut self, run: RunRecord) {
        while self.runs.len() >= self.max_runs.max(1) {
            self.runs.pop_front();
        }
        self.runs.push_back(run);
    }

    /// Applies `f` to the run with `id`; returns false if it has been evicted
    pub fn update_run(&mut self, id: &str, f: impl FnOnce(&mut RunRecord)) -> bool {
        match self.runs.iter_mut().find(|r| r.id == id) {
            Some(run) => {
                f(run);
                true
            }
            None => false,
        }
    }

    pub fn get_run(&self, id: &str) -> Option<&RunRecord> {
        self.runs.iter().find(|r| r.id == id)
    }

    /// Newest first
    pub fn get_recent_runs(&self, limit: usize) -> Vec<RunRecord> {
        self.runs.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_runs_by_status(&self, status: RunStatus, limit: usize) -> Vec<RunRecord> {
        self.runs
            .iter()
            .rev()
            .filter(|r| r.status == status)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn counts(&self) -> RunCounts {
        self.runs.iter().fold(RunCounts::default(), |mut counts, r| {
            match r.status {
                RunStatus::Running => counts.running += 1,
                RunStatus::Succeeded => counts.succeeded += 1,
                RunStatus::Failed => counts.failed += 1,
            }
            counts
        })
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
