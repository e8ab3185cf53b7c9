// src/jobs.rs
//
// Explicit job registry for the orchestrator layer: create a job, mutate its
// progress and status while a worker runs the analyzer, retrieve or evict the
// finished record. A thin API wrapper owns one registry; per-job tracker
// state never lives here.

use crate::types::AnalysisReport;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub current: usize,
    pub total: usize,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: u64,
    pub status: JobStatus,
    pub progress: JobProgress,
    pub report: Option<AnalysisReport>,
}

pub struct JobRegistry {
    jobs: Mutex<HashMap<u64, Job>>,
    next_id: AtomicU64,
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            id,
            status: JobStatus::Queued,
            progress: JobProgress::default(),
            report: None,
        };
        self.jobs.lock().expect("job registry poisoned").insert(id, job);
        id
    }

    pub fn set_running(&self, id: u64) {
        self.with_job(id, |job| job.status = JobStatus::Running);
    }

    pub fn update_progress(&self, id: u64, current: usize, total: usize, message: &str) {
        self.with_job(id, |job| {
            job.progress = JobProgress {
                current,
                total,
                message: message.to_string(),
            };
        });
    }

    /// Attach the finished report; the status follows its success flag and
    /// whether the run was cancelled mid-way.
    pub fn complete(&self, id: u64, report: AnalysisReport) {
        self.with_job(id, |job| {
            job.status = if !report.success {
                JobStatus::Failed
            } else if report
                .payload
                .as_ref()
                .map_or(false, |p| p.metadata.cancelled)
            {
                JobStatus::Cancelled
            } else {
                JobStatus::Completed
            };
            job.report = Some(report);
        });
    }

    pub fn get(&self, id: u64) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job registry poisoned")
            .get(&id)
            .cloned()
    }

    /// Remove and return the job record; finished jobs are evicted once
    /// their consumer has read the result.
    pub fn evict(&self, id: u64) -> Option<Job> {
        self.jobs
            .lock()
            .expect("job registry poisoned")
            .remove(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().expect("job registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn with_job(&self, id: u64, mutate: impl FnOnce(&mut Job)) {
        if let Some(job) = self
            .jobs
            .lock()
            .expect("job registry poisoned")
            .get_mut(&id)
        {
            mutate(job);
        }
    }
}
