//! Fire-and-forget background jobs.
//!
//! Each submitted unit of work runs exactly once on the tokio runtime. There is
//! no retry: a failure is logged, counted and reported to whoever listens.

use std::fmt::Display;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, oneshot};
use tracing::{debug, warn};

use crate::metrics;

pub type JobId = u64;

const REPORT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Failed(String),
}

impl JobOutcome {
    fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "succeeded",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

/// Broadcast once per finished job
#[derive(Debug, Clone)]
pub struct JobReport {
    pub id: JobId,
    pub name: String,
    pub outcome: JobOutcome,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JobError {
    #[error("job failed: {0}")]
    Failed(String),

    #[error("job ended without reporting (panicked or runtime shut down)")]
    Lost,
}

/// Handle to a submitted job. Dropping it does not cancel the job.
pub struct JobHandle<T> {
    pub id: JobId,
    pub name: String,
    done: oneshot::Receiver<Result<T, String>>,
}

impl<T> JobHandle<T> {
    /// Wait for the job to finish
    pub async fn wait(self) -> Result<T, JobError> {
        match self.done.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(JobError::Failed(message)),
            Err(_) => Err(JobError::Lost),
        }
    }
}

#[derive(Clone)]
pub struct Jobs {
    next_id: Arc<AtomicU64>,
    reports: broadcast::Sender<JobReport>,
}

impl Default for Jobs {
    fn default() -> Self {
        Self::new()
    }
}

impl Jobs {
    pub fn new() -> Self {
        let (reports, _) = broadcast::channel(REPORT_CAPACITY);
        Self {
            next_id: Arc::new(AtomicU64::new(1)),
            reports,
        }
    }

    /// Receive a `JobReport` for every job finishing from now on
    pub fn subscribe(&self) -> broadcast::Receiver<JobReport> {
        self.reports.subscribe()
    }

    /// Run `work` once in the background. Must be called within a tokio runtime.
    pub fn submit<T, E, F>(&self, name: impl Into<String>, work: F) -> JobHandle<T>
    where
        T: Send + 'static,
        E: Display + Send + 'static,
        F: Future<Output = Result<T, E>> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let name = name.into();
        let (tx, done) = oneshot::channel();
        let reports = self.reports.clone();
        let job_name = name.clone();

        debug!(job = id, name = %name, "job submitted");
        tokio::spawn(async move {
            let result = work.await.map_err(|e| e.to_string());
            let outcome = match &result {
                Ok(_) => JobOutcome::Succeeded,
                Err(message) => {
                    warn!(job = id, name = %job_name, error = %message, "job failed");
                    JobOutcome::Failed(message.clone())
                }
            };
            metrics::JOBS_TOTAL
                .with_label_values(&[outcome.label()])
                .inc();
            debug!(job = id, name = %job_name, outcome = outcome.label(), "job finished");

            // nobody listening is fine
            let _ = reports.send(JobReport {
                id,
                name: job_name,
                outcome,
            });
            let _ = tx.send(result);
        });

        JobHandle { id, name, done }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[tokio::test]
    async fn test_job_runs_once_and_returns_value() {
        let jobs = Jobs::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();

        let handle = jobs.submit("count", async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, String>(42)
        });
        assert_eq!(handle.wait().await, Ok(42));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_retried() {
        let jobs = Jobs::new();
        let mut reports = jobs.subscribe();

        let handle = jobs.submit("explode", async { Err::<(), _>("remote said no") });
        let id = handle.id;
        assert_eq!(
            handle.wait().await,
            Err(JobError::Failed("remote said no".to_string()))
        );

        let report = reports.recv().await.unwrap();
        assert_eq!(report.id, id);
        assert_eq!(report.name, "explode");
        assert_eq!(report.outcome, JobOutcome::Failed("remote said no".to_string()));
    }

    #[tokio::test]
    async fn test_ids_are_distinct() {
        let jobs = Jobs::new();
        let a = jobs.submit("a", async { Ok::<_, String>(()) });
        let b = jobs.submit("b", async { Ok::<_, String>(()) });
        assert_ne!(a.id, b.id);
        a.wait().await.unwrap();
        b.wait().await.unwrap();
    }
}
