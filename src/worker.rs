//! Polling worker loop.
//!
//! A [`Worker`] repeatedly reserves the next claimable job and hands it to
//! the embedding application's [`JobHandler`]. This crate only coordinates:
//! successful disposition of a row (deleting a finished one-shot job,
//! rescheduling, unlocking a recurring job for its next window) is the
//! handler's business, done through the application's own storage access. A
//! handler error marks the job permanently failed, which takes it out of
//! scheduling until something external clears `failed_at`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::QueueResult;
use crate::jobs::models::Job;
use crate::queue::JobQueue;
use crate::store::JobStore;

/// Executes one claimed job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> anyhow::Result<()>;
}

pub struct Worker<S: JobStore> {
    queue: JobQueue<S>,
    handler: Arc<dyn JobHandler>,
    shutdown: CancellationToken,
}

impl<S: JobStore> Worker<S> {
    pub fn new(queue: JobQueue<S>, handler: Arc<dyn JobHandler>) -> Self {
        Self {
            queue,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) after the in-flight job, if any.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn queue(&self) -> &JobQueue<S> {
        &self.queue
    }

    /// Claims and executes at most one job. Returns whether a job was run.
    pub async fn work_once(&self) -> QueueResult<bool> {
        let Some(mut job) = self.queue.reserve().await? else {
            return Ok(false);
        };

        tracing::info!(
            job_id = job.id,
            job_name = job.name.as_deref().unwrap_or(""),
            "Claimed job"
        );
        match self.handler.run(&job).await {
            Ok(()) => {
                tracing::info!(job_id = job.id, "Job finished");
            }
            Err(e) => {
                tracing::error!(job_id = job.id, error = %e, "Job handler failed");
                if !self.queue.mark_failed(&mut job).await? {
                    // The lock aged out mid-run and somebody stole it.
                    tracing::warn!(job_id = job.id, "Lost the lock before recording failure");
                }
            }
        }
        Ok(true)
    }

    /// Polls until cancelled, sleeping `poll_interval` between empty polls.
    ///
    /// On cancellation every lock still held under this worker's identity
    /// is released before returning, so a graceful shutdown never strands
    /// jobs for the length of the staleness window. Storage failures abort
    /// the loop and propagate; retry/backoff policy belongs to the caller.
    pub async fn run(&self) -> QueueResult<()> {
        tracing::info!(worker = %self.queue.worker_name(), "Worker started");
        let poll_interval =
            std::time::Duration::from_secs(self.queue.settings().poll_interval);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                worked = self.work_once() => {
                    if !worked? {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
            }
        }

        self.queue.clear_locks().await?;
        tracing::info!(worker = %self.queue.worker_name(), "Worker stopped");
        Ok(())
    }
}
