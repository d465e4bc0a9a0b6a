//! Runs one job under a hard wall-clock ceiling, warning once when the soft
//! limit passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopper_core::config::JobConfig;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed,
    TimedOut,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub run_id: Uuid,
    pub job: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// Job output on success, `{"error": ...}` otherwise.
    pub detail: serde_json::Value,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

#[derive(Debug, Clone)]
pub struct JobRunner {
    soft_limit: Duration,
    hard_limit: Duration,
}

impl JobRunner {
    pub fn new(soft_limit: Duration, hard_limit: Duration) -> Self {
        Self {
            soft_limit,
            hard_limit,
        }
    }

    pub fn from_config(config: &JobConfig) -> Self {
        Self::new(
            Duration::from_secs(config.soft_limit_secs),
            Duration::from_secs(config.hard_limit_secs),
        )
    }

    /// Drives `job` to completion or until the hard limit, whichever comes
    /// first. A timed-out job is dropped at its next suspension point.
    pub async fn run<F, T>(&self, name: &str, job: F) -> JobReport
    where
        F: Future<Output = anyhow::Result<T>>,
        T: Serialize,
    {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();
        info!(job = name, run_id = %run_id, "Job started");

        let work = tokio::time::timeout(self.hard_limit, job);
        tokio::pin!(work);
        let soft = tokio::time::sleep(self.soft_limit);
        tokio::pin!(soft);
        let mut soft_passed = false;

        let outcome = loop {
            tokio::select! {
                result = &mut work => break result,
                _ = &mut soft, if !soft_passed => {
                    soft_passed = true;
                    metrics::counter!("jobs.soft_limit_exceeded").increment(1);
                    warn!(
                        job = name,
                        run_id = %run_id,
                        soft_limit_secs = self.soft_limit.as_secs_f64(),
                        "Job passed its soft time limit and is still running"
                    );
                }
            }
        };

        let (status, detail) = match outcome {
            Ok(Ok(value)) => match serde_json::to_value(value) {
                Ok(detail) => (JobStatus::Succeeded, detail),
                Err(e) => (
                    JobStatus::Failed,
                    serde_json::json!({ "error": format!("unserializable job output: {e}") }),
                ),
            },
            Ok(Err(e)) => (
                JobStatus::Failed,
                serde_json::json!({ "error": format!("{e:#}") }),
            ),
            Err(_) => {
                metrics::counter!("jobs.timeouts").increment(1);
                (
                    JobStatus::TimedOut,
                    serde_json::json!({
                        "error": format!(
                            "exceeded hard limit of {:.3}s",
                            self.hard_limit.as_secs_f64()
                        )
                    }),
                )
            }
        };

        let elapsed_ms = start.elapsed().as_millis() as u64;
        match status {
            JobStatus::Succeeded => info!(job = name, run_id = %run_id, elapsed_ms, "Job succeeded"),
            _ => warn!(job = name, run_id = %run_id, status = ?status, elapsed_ms, detail = %detail, "Job did not succeed"),
        }

        JobReport {
            run_id,
            job: name.to_string(),
            status,
            started_at,
            finished_at: Utc::now(),
            elapsed_ms,
            detail,
        }
    }
}
