//! Run report module for wav2mp3
//!
//! Per-job outcomes and run-level counters, with JSON serialization support.

use crate::dispatcher::DispatchSummary;
use crate::jobs::{JobIndex, JobStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Result of one job, recorded by the worker that processed it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobOutcome {
    pub index: JobIndex,
    pub worker: usize,
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub status: JobStatus,
    pub frames_read: u64,
    pub bytes_written: u64,
    pub elapsed_ms: u64,
    pub error: Option<String>,
}

/// What a single worker did during the run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkerStats {
    pub worker: usize,
    pub claimed: usize,
    pub converted: usize,
    pub failed: usize,
    pub outcomes: Vec<JobOutcome>,
}

impl WorkerStats {
    pub fn new(worker: usize) -> Self {
        Self {
            worker,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: JobOutcome) {
        self.claimed += 1;
        match outcome.status {
            JobStatus::Done => self.converted += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Pending | JobStatus::InProgress => {}
        }
        self.outcomes.push(outcome);
    }
}

/// Summary of a whole conversion run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RunReport {
    pub directory: PathBuf,
    pub workers: usize,
    pub discovered: usize,
    pub converted: usize,
    pub failed: usize,
    /// Jobs never started because the run was cancelled
    pub not_started: usize,
    pub cancelled: bool,
    pub elapsed_ms: u64,
    /// Outcomes ordered by job index
    pub jobs: Vec<JobOutcome>,
}

impl RunReport {
    /// Assemble the report from the dispatcher's final counts and the
    /// outcomes gathered by every worker
    pub fn assemble(
        directory: PathBuf,
        summary: DispatchSummary,
        workers: Vec<WorkerStats>,
        cancelled: bool,
        elapsed_ms: u64,
    ) -> Self {
        let worker_count = workers.len();
        let mut jobs: Vec<JobOutcome> = workers.into_iter().flat_map(|w| w.outcomes).collect();
        jobs.sort_by_key(|o| o.index);

        Self {
            directory,
            workers: worker_count,
            discovered: summary.total,
            converted: summary.done,
            failed: summary.failed,
            not_started: summary.pending,
            cancelled,
            elapsed_ms,
            jobs,
        }
    }

    /// Check if every discovered file was converted
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_started == 0 && !self.cancelled
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text summary for the console
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Directory: {}\n", self.directory.display()));
        out.push_str(&format!("Workers: {}\n", self.workers));
        out.push_str(&format!("Files discovered: {}\n", self.discovered));
        out.push_str(&format!("Files converted: {}\n", self.converted));
        out.push_str(&format!("Files failed: {}\n", self.failed));
        if self.cancelled {
            out.push_str(&format!("Cancelled, not started: {}\n", self.not_started));
        }
        for job in self.jobs.iter().filter(|j| j.status == JobStatus::Failed) {
            out.push_str(&format!(
                "  FAILED {}: {}\n",
                job.source_path.display(),
                job.error.as_deref().unwrap_or("unknown error")
            ));
        }
        out.push_str(&format!("Elapsed: {:.2}s\n", self.elapsed_ms as f64 / 1000.0));
        out
    }
}
