//! In-memory tracker for asynchronous merge and split jobs
//!
//! Jobs start `pending` and move exactly once to `completed` or `error`.
//! The map lives for the process lifetime; finished jobs are evicted by the
//! sweeper after the retention window.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pdfjoin_core::CommandKind;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ApiError;
use crate::staging::FileLink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    pub kind: CommandKind,
    pub status: JobStatus,
    pub files: Vec<FileLink>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Client view of a job
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: Uuid,
    pub kind: CommandKind,
    pub status: JobStatus,
    pub files: Vec<FileLink>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            kind: job.kind,
            status: job.status,
            files: job.files,
            error: job.error,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    jobs: Arc<DashMap<Uuid, Job>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, kind: CommandKind) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.insert(
            id,
            Job {
                id,
                kind,
                status: JobStatus::Pending,
                files: Vec::new(),
                error: None,
                created_at: Utc::now(),
                finished_at: None,
            },
        );
        info!(job_id = %id, kind = %kind, "Job created");
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<Job> {
        self.jobs.get(id).map(|job| job.clone())
    }

    /// Await `operation` and record its outcome on job `id`
    pub async fn run<F>(&self, id: Uuid, operation: F)
    where
        F: Future<Output = Result<Vec<FileLink>, ApiError>>,
    {
        let outcome = operation.await;
        self.finish(id, outcome);
    }

    fn finish(&self, id: Uuid, outcome: Result<Vec<FileLink>, ApiError>) {
        let Some(mut job) = self.jobs.get_mut(&id) else {
            warn!(job_id = %id, "Finished job is no longer tracked");
            return;
        };

        if job.status.is_terminal() {
            warn!(job_id = %id, status = ?job.status, "Ignoring second completion of job");
            return;
        }

        match outcome {
            Ok(files) => {
                info!(job_id = %id, files = files.len(), "Job completed");
                job.status = JobStatus::Completed;
                job.files = files;
            }
            Err(e) => {
                warn!(job_id = %id, error = %e, "Job failed");
                job.status = JobStatus::Error;
                job.error = Some(e.client_message());
            }
        }
        job.finished_at = Some(Utc::now());
    }

    /// Drop finished jobs that ended before `cutoff`. Pending jobs stay.
    pub fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut evicted = 0;
        self.jobs.retain(|_, job| {
            let expired = matches!(job.finished_at, Some(finished) if finished < cutoff);
            if expired {
                evicted += 1;
            }
            !expired
        });
        evicted
    }
}
