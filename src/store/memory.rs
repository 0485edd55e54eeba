//! In-process job store.
//!
//! Backs the coordination logic with a plain `Vec` behind a `tokio` RwLock,
//! for unit tests and single-process development setups. Each conditional
//! update holds the write guard for its whole check-and-set, which gives the
//! same atomicity the database provides per row.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use tokio::sync::RwLock;

use crate::error::QueueResult;
use crate::jobs::models::{Job, NewJob};
use crate::store::{CandidateQuery, JobStore};

#[derive(Default)]
pub struct MemStore {
    rows: RwLock<Vec<Job>>,
    next_id: AtomicI32,
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            next_id: AtomicI32::new(1),
        }
    }

    /// Inserts a job, assigning an id and defaulting `run_at` to now.
    pub async fn insert(&self, new: NewJob) -> Job {
        let now = Utc::now().naive_utc();
        let job = Job {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            name: new.name,
            priority: new.priority,
            attempts: 0,
            run_at: new.run_at.unwrap_or(now),
            locked_at: None,
            locked_by: None,
            failed_at: None,
            last_run_at: new.last_run_at,
            period: new.period,
            at: new.at,
            stop_at: new.stop_at,
            payload: new.payload,
            created_at: now,
            updated_at: now,
        };
        self.rows.write().await.push(job.clone());
        job
    }

    pub async fn get(&self, id: i32) -> Option<Job> {
        self.rows.read().await.iter().find(|j| j.id == id).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Job> {
        self.rows.read().await.clone()
    }
}

fn runnable(job: &Job, now: NaiveDateTime, lock_cutoff: NaiveDateTime) -> bool {
    job.run_at <= now && job.locked_at.is_none_or(|at| at < lock_cutoff)
}

#[async_trait]
impl JobStore for MemStore {
    async fn find_candidates(&self, query: &CandidateQuery) -> QueueResult<Vec<Job>> {
        let rows = self.rows.read().await;
        let mut candidates: Vec<Job> = rows
            .iter()
            .filter(|job| job.failed_at.is_none())
            .filter(|job| {
                runnable(job, query.now, query.lock_cutoff)
                    || job.locked_by_worker(&query.worker)
            })
            .filter(|job| query.min_priority.is_none_or(|floor| job.priority >= floor))
            .filter(|job| query.max_priority.is_none_or(|ceiling| job.priority <= ceiling))
            .cloned()
            .collect();
        candidates.sort_by_key(|job| (job.priority, job.run_at));
        candidates.truncate(query.limit as usize);
        Ok(candidates)
    }

    async fn acquire_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
        lock_cutoff: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|job| job.id == job_id && runnable(job, now, lock_cutoff))
        {
            Some(job) => {
                job.locked_at = Some(now);
                job.locked_by = Some(worker.to_string());
                job.last_run_at = Some(now);
                job.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn refresh_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|job| job.id == job_id && job.locked_by_worker(worker))
        {
            Some(job) => {
                job.locked_at = Some(now);
                job.last_run_at = Some(now);
                job.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn mark_failed(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|job| job.id == job_id && job.locked_by_worker(worker))
        {
            Some(job) => {
                job.failed_at = Some(now);
                job.attempts += 1;
                job.updated_at = now;
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn release_locks(&self, worker: &str) -> QueueResult<u64> {
        let mut rows = self.rows.write().await;
        let mut released = 0;
        for job in rows.iter_mut().filter(|job| job.locked_by_worker(worker)) {
            job.locked_at = None;
            job.locked_by = None;
            released += 1;
        }
        Ok(released)
    }

    async fn current_time(&self) -> QueueResult<NaiveDateTime> {
        Ok(Utc::now().naive_utc())
    }
}
