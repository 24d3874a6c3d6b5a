//! Background execution of pipeline runs on a bounded worker pool.

use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::Pipeline;
use crate::constants::{EVT_FILE_FAILED, EVT_FILE_PROCESSED};

#[derive(Debug, Clone)]
pub struct PipelineJob {
    pub project_id: String,
    pub path: PathBuf,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DispatchError {
    #[error("pipeline queue is full")]
    QueueFull,

    #[error("pipeline dispatcher has stopped")]
    Closed,
}

impl<T> From<TrySendError<T>> for DispatchError {
    fn from(e: TrySendError<T>) -> Self {
        match e {
            TrySendError::Full(_) => DispatchError::QueueFull,
            TrySendError::Closed(_) => DispatchError::Closed,
        }
    }
}

/// Handle for submitting jobs; cheap to clone into request handlers
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<PipelineJob>,
}

impl Dispatcher {
    /// Spawn the consumer. It exits once every `Dispatcher` clone is dropped and in-flight runs finished.
    pub fn start(pipeline: Arc<Pipeline>, workers: usize, capacity: usize) -> (Self, JoinHandle<()>) {
        let workers = workers.max(1);
        let (tx, mut rx) = mpsc::channel::<PipelineJob>(capacity.max(1));
        let permits = Arc::new(Semaphore::new(workers));

        let handle = tokio::spawn(async move {
            info!(workers, "pipeline dispatcher started");
            while let Some(job) = rx.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let pipeline = pipeline.clone();
                tokio::spawn(async move {
                    run_job(&pipeline, job).await;
                    drop(permit);
                });
            }
            // wait for in-flight runs
            let _ = permits.acquire_many(workers as u32).await;
            info!("pipeline dispatcher stopped");
        });

        (Self { tx }, handle)
    }

    /// Enqueue without waiting; fails when the queue is at capacity
    pub fn submit(&self, job: PipelineJob) -> Result<(), DispatchError> {
        self.tx.try_send(job)?;
        Ok(())
    }
}

async fn run_job(pipeline: &Pipeline, job: PipelineJob) {
    let events = pipeline.events();
    let path = job.path.display().to_string();
    match pipeline.process_file(&job.project_id, &job.path).await {
        Ok(summary) => {
            events
                .publish(
                    EVT_FILE_PROCESSED,
                    json!({
                        "project_id": job.project_id,
                        "path": path,
                        "rows": summary.rows,
                        "issues": summary.quality.issues.len(),
                        "delivered": summary.delivery.ok,
                        "status_code": summary.delivery.status_code,
                        "attempts": summary.delivery.attempts,
                    }),
                )
                .await;
        }
        Err(e) => {
            error!(project_id = %job.project_id, path = %path, error = %e, "pipeline job failed");
            events
                .publish(
                    EVT_FILE_FAILED,
                    json!({"project_id": job.project_id, "path": path, "error": e.to_string()}),
                )
                .await;
        }
    }
}
