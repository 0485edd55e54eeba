//! Storage port for the job table.
//!
//! All coordination logic talks to the shared `jobs` table through the
//! [`JobStore`] trait, so the locking protocol can be exercised against an
//! in-process store in tests and against PostgreSQL in production. The
//! contract that matters is row-count semantics: each conditional update
//! must check its predicate and apply its writes as one atomic step with
//! respect to concurrent callers on the same row, and report how many rows
//! it actually modified.

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::QueueResult;
use crate::jobs::models::Job;

/// Typed bounds for a candidate query, passed to the store in one piece.
#[derive(Debug, Clone)]
pub struct CandidateQuery {
    /// Identity of the polling worker.
    pub worker: String,
    /// The instant the query is evaluated against.
    pub now: NaiveDateTime,
    /// Locks acquired before this instant are stale and claimable.
    pub lock_cutoff: NaiveDateTime,
    /// Maximum number of rows to return.
    pub limit: i64,
    /// Only jobs with `priority >= min_priority`, when set.
    pub min_priority: Option<i32>,
    /// Only jobs with `priority <= max_priority`, when set.
    pub max_priority: Option<i32>,
}

/// Async access to the shared job table.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Returns jobs structurally eligible for the querying worker: not
    /// failed, within the priority bounds, and either runnable (scheduled
    /// time reached, unlocked or stale-locked) or already held by the
    /// worker itself. Ordered by ascending priority, then ascending
    /// `run_at`, capped at `limit`.
    async fn find_candidates(&self, query: &CandidateQuery) -> QueueResult<Vec<Job>>;

    /// Atomically claims a job for `worker`, but only if at write time the
    /// row is still runnable: `run_at <= now` and the lock is absent or
    /// older than `lock_cutoff`. Sets `locked_at`, `locked_by`, and
    /// `last_run_at` to `now`. Returns the number of rows modified; zero
    /// means another worker won the race.
    async fn acquire_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
        lock_cutoff: NaiveDateTime,
    ) -> QueueResult<usize>;

    /// Atomically refreshes a lock the worker already holds, updating
    /// `locked_at` and `last_run_at`. Returns the number of rows modified;
    /// zero means the worker no longer holds the job.
    async fn refresh_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize>;

    /// Records a permanent failure on a job, but only while `worker` holds
    /// its lock: sets `failed_at` and increments `attempts`. Returns the
    /// number of rows modified. Failed jobs are excluded from candidate
    /// selection until something external clears `failed_at`.
    async fn mark_failed(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize>;

    /// Unconditionally releases every lock held by `worker`. Idempotent.
    /// Returns the number of locks released.
    async fn release_locks(&self, worker: &str) -> QueueResult<u64>;

    /// The store's authoritative clock. Workers coordinating through one
    /// store must compare `now` values from the same basis.
    async fn current_time(&self) -> QueueResult<NaiveDateTime>;
}
