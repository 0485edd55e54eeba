//! Candidate selection and exclusive locking.
//!
//! [`JobQueue`] is the coordination facade one worker process uses against
//! the shared job table: fetch an ordered batch of claimable jobs, try to
//! lock them one at a time, and release everything held on shutdown. There
//! is no lock manager anywhere: at most one concurrent executor per job is
//! enforced purely by the store's conditional-update row counts, so lock
//! contention shows up here as `Ok(false)`, never as an error.

use std::sync::Arc;

use chrono::Duration;

use crate::config::WorkerSettings;
use crate::error::QueueResult;
use crate::jobs::models::Job;
use crate::jobs::recurrence;
use crate::store::{CandidateQuery, JobStore};

pub struct JobQueue<S: JobStore> {
    store: Arc<S>,
    settings: WorkerSettings,
}

impl<S: JobStore> Clone for JobQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            settings: self.settings.clone(),
        }
    }
}

impl<S: JobStore> JobQueue<S> {
    pub fn new(store: Arc<S>, settings: WorkerSettings) -> Self {
        Self { store, settings }
    }

    pub fn worker_name(&self) -> &str {
        &self.settings.worker_name
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    fn max_run_time(&self) -> Duration {
        Duration::seconds(self.settings.max_run_time as i64)
    }

    /// Returns up to `limit` jobs this worker may try to claim, in
    /// scheduling order (ascending priority, then ascending `run_at`).
    ///
    /// Selection runs in two phases: the store applies the structural
    /// filter (not failed, scheduled time reached, unlocked / stale-locked /
    /// already ours, priority within bounds), then periodic jobs are kept
    /// only if their recurrence is currently due. The second phase lives
    /// here because the due-ness predicate spans period, time-of-day, and
    /// expiry at once, which the store cannot evaluate in a single query.
    ///
    /// A job whose `at` spec fails to parse is logged and dropped from the
    /// batch; it never blocks scheduling of unrelated jobs.
    pub async fn find_available(&self, limit: i64) -> QueueResult<Vec<Job>> {
        let now = self.store.current_time().await?;
        let query = CandidateQuery {
            worker: self.settings.worker_name.clone(),
            now,
            lock_cutoff: now - self.max_run_time(),
            limit,
            min_priority: self.settings.min_priority,
            max_priority: self.settings.max_priority,
        };

        let candidates = self.store.find_candidates(&query).await?;

        let mut available = Vec::with_capacity(candidates.len());
        for job in candidates {
            if !job.is_periodic() {
                available.push(job);
                continue;
            }
            match recurrence::is_due(job.last_run_at, now, job.period, job.at.as_deref(), job.stop_at)
            {
                Ok(true) => available.push(job),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(
                        job_id = job.id,
                        job_name = job.name.as_deref().unwrap_or(""),
                        error = %e,
                        "Skipping job with malformed time spec"
                    );
                }
            }
        }

        Ok(available)
    }

    /// Attempts to claim `job` for this worker.
    ///
    /// If another worker appears to hold the job (or nobody does), this
    /// issues the conditional claim: the store re-checks at write time that
    /// the row is still runnable and its lock, if any, has aged past
    /// `max_run_time`. If this worker already holds the job, the lock is
    /// refreshed instead, without the freshness predicate, so a worker can
    /// resume its own jobs after a crash-restart cycle.
    ///
    /// Returns `Ok(true)` and updates `job` in place iff exactly one row
    /// was modified. `Ok(false)` means somebody else won the race, an
    /// expected outcome; the caller just moves on to the next candidate.
    pub async fn lock_exclusively(&self, job: &mut Job) -> QueueResult<bool> {
        let now = self.store.current_time().await?;
        let worker = self.settings.worker_name.as_str();

        let affected = if job.locked_by_worker(worker) {
            self.store.refresh_lock(job.id, worker, now).await?
        } else {
            self.store
                .acquire_lock(job.id, worker, now, now - self.max_run_time())
                .await?
        };

        if affected == 1 {
            job.locked_at = Some(now);
            job.locked_by = Some(worker.to_string());
            job.last_run_at = Some(now);
            Ok(true)
        } else {
            tracing::debug!(job_id = job.id, "Lost lock race");
            Ok(false)
        }
    }

    /// Records a permanent failure on a job this worker holds. The write
    /// only lands while the lock is still ours, with the same row-count
    /// semantics as locking. Failed jobs drop out of candidate selection
    /// entirely; clearing `failed_at` again is retry policy and belongs to
    /// the embedding application.
    pub async fn mark_failed(&self, job: &mut Job) -> QueueResult<bool> {
        let now = self.store.current_time().await?;
        let affected = self
            .store
            .mark_failed(job.id, &self.settings.worker_name, now)
            .await?;
        if affected == 1 {
            job.failed_at = Some(now);
            job.attempts += 1;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Claims and returns the next runnable job, or `None` when every
    /// candidate in this poll was contended away or nothing is due.
    pub async fn reserve(&self) -> QueueResult<Option<Job>> {
        let batch = self.find_available(self.settings.read_ahead).await?;
        for mut job in batch {
            if self.lock_exclusively(&mut job).await? {
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    /// Releases every lock held under this worker's identity, so other
    /// workers can pick the jobs back up immediately instead of waiting out
    /// the staleness window. Idempotent.
    pub async fn clear_locks(&self) -> QueueResult<u64> {
        let released = self
            .store
            .release_locks(&self.settings.worker_name)
            .await?;
        if released > 0 {
            tracing::info!(
                worker = %self.settings.worker_name,
                released,
                "Released held job locks"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use futures::future::join_all;

    use super::*;
    use crate::jobs::models::NewJob;
    use crate::store::MemStore;

    fn queue_for(store: &Arc<MemStore>, worker: &str) -> JobQueue<MemStore> {
        let settings = WorkerSettings {
            worker_name: worker.to_string(),
            max_run_time: 3600,
            ..Default::default()
        };
        JobQueue::new(Arc::clone(store), settings)
    }

    fn runnable_job() -> NewJob {
        NewJob {
            run_at: Some(Utc::now().naive_utc() - Duration::seconds(60)),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_failed_jobs_are_never_candidates() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        let other = queue_for(&store, "w2");
        let mut job = store.insert(runnable_job()).await;

        assert!(queue.lock_exclusively(&mut job).await.unwrap());
        assert!(queue.mark_failed(&mut job).await.unwrap());

        // Failed jobs are invisible to everyone, holder included.
        assert!(queue.find_available(5).await.unwrap().is_empty());
        assert!(other.find_available(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_failed_requires_holding_the_lock() {
        let store = Arc::new(MemStore::new());
        let holder = queue_for(&store, "w1");
        let other = queue_for(&store, "w2");
        let job = store.insert(runnable_job()).await;

        let mut held = job.clone();
        assert!(holder.lock_exclusively(&mut held).await.unwrap());

        let mut seen_by_other = job;
        assert!(!other.mark_failed(&mut seen_by_other).await.unwrap());
        assert!(store.get(held.id).await.unwrap().failed_at.is_none());
    }

    #[tokio::test]
    async fn test_future_jobs_are_not_candidates() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        store
            .insert(NewJob {
                run_at: Some(Utc::now().naive_utc() + Duration::seconds(3600)),
                ..Default::default()
            })
            .await;

        assert!(queue.find_available(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_priority_bounds_filter_candidates() {
        let store = Arc::new(MemStore::new());
        let settings = WorkerSettings {
            worker_name: "w1".to_string(),
            min_priority: Some(0),
            max_priority: Some(10),
            ..Default::default()
        };
        let queue = JobQueue::new(Arc::clone(&store), settings);

        store
            .insert(NewJob {
                priority: -5,
                ..runnable_job()
            })
            .await;
        let inside = store
            .insert(NewJob {
                priority: 3,
                ..runnable_job()
            })
            .await;
        store
            .insert(NewJob {
                priority: 50,
                ..runnable_job()
            })
            .await;

        let found = queue.find_available(5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, inside.id);
    }

    #[tokio::test]
    async fn test_periodic_job_not_due_is_filtered() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");

        // Ran 30s ago with a 300s period: structurally eligible, not due.
        store
            .insert(NewJob {
                period: Some(300),
                last_run_at: Some(Utc::now().naive_utc() - Duration::seconds(30)),
                ..runnable_job()
            })
            .await;
        // Same shape but one-shot: always passes the post-filter.
        let one_shot = store
            .insert(NewJob {
                last_run_at: Some(Utc::now().naive_utc() - Duration::seconds(30)),
                ..runnable_job()
            })
            .await;

        let found = queue.find_available(5).await.unwrap();
        let ids: Vec<i32> = found.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![one_shot.id]);
    }

    #[tokio::test]
    async fn test_periodic_job_past_period_is_due() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        let job = store
            .insert(NewJob {
                period: Some(60),
                last_run_at: Some(Utc::now().naive_utc() - Duration::seconds(61)),
                ..runnable_job()
            })
            .await;

        let found = queue.find_available(5).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, job.id);
    }

    #[tokio::test]
    async fn test_expired_recurrence_is_filtered() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        store
            .insert(NewJob {
                period: Some(60),
                stop_at: Some(Utc::now().naive_utc() - Duration::seconds(10)),
                ..runnable_job()
            })
            .await;

        assert!(queue.find_available(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_time_spec_skips_job_not_batch() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        store
            .insert(NewJob {
                period: Some(60),
                at: Some("whenever".to_string()),
                ..runnable_job()
            })
            .await;
        let healthy = store.insert(runnable_job()).await;

        let found = queue.find_available(5).await.unwrap();
        let ids: Vec<i32> = found.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![healthy.id]);
    }

    #[tokio::test]
    async fn test_lock_then_contend() {
        let store = Arc::new(MemStore::new());
        let winner = queue_for(&store, "w1");
        let loser = queue_for(&store, "w2");
        let job = store.insert(runnable_job()).await;

        let mut seen_by_winner = job.clone();
        let mut seen_by_loser = job;
        assert!(winner.lock_exclusively(&mut seen_by_winner).await.unwrap());
        assert_eq!(seen_by_winner.locked_by.as_deref(), Some("w1"));
        assert!(!loser.lock_exclusively(&mut seen_by_loser).await.unwrap());
    }

    #[tokio::test]
    async fn test_relock_own_job_refreshes() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        let mut job = store.insert(runnable_job()).await;

        assert!(queue.lock_exclusively(&mut job).await.unwrap());
        let first_locked_at = job.locked_at;

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        // Second claim takes the holder path: no freshness predicate needed.
        assert!(queue.lock_exclusively(&mut job).await.unwrap());
        assert!(job.locked_at >= first_locked_at);
        assert_eq!(job.locked_by.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_own_locked_job_stays_visible() {
        let store = Arc::new(MemStore::new());
        let holder = queue_for(&store, "w1");
        let other = queue_for(&store, "w2");
        let mut job = store.insert(runnable_job()).await;
        assert!(holder.lock_exclusively(&mut job).await.unwrap());

        // The holder re-sees its own lock; other workers do not.
        assert_eq!(holder.find_available(5).await.unwrap().len(), 1);
        assert!(other.find_available(5).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reserve_returns_first_lockable() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        let rival = queue_for(&store, "w2");

        let mut first = store
            .insert(NewJob {
                priority: 1,
                ..runnable_job()
            })
            .await;
        let second = store
            .insert(NewJob {
                priority: 2,
                ..runnable_job()
            })
            .await;

        // A rival already holds the head of the queue.
        assert!(rival.lock_exclusively(&mut first).await.unwrap());

        let claimed = queue.reserve().await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert_eq!(claimed.locked_by.as_deref(), Some("w1"));
    }

    #[tokio::test]
    async fn test_reserve_with_nothing_due() {
        let store = Arc::new(MemStore::new());
        let queue = queue_for(&store, "w1");
        assert!(queue.reserve().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_locks_releases_only_own() {
        let store = Arc::new(MemStore::new());
        let mine = queue_for(&store, "w1");
        let theirs = queue_for(&store, "w2");

        let mut a = store.insert(runnable_job()).await;
        let mut b = store.insert(runnable_job()).await;
        let mut c = store.insert(runnable_job()).await;
        assert!(mine.lock_exclusively(&mut a).await.unwrap());
        assert!(mine.lock_exclusively(&mut b).await.unwrap());
        assert!(theirs.lock_exclusively(&mut c).await.unwrap());

        assert_eq!(mine.clear_locks().await.unwrap(), 2);
        for job in store.snapshot().await {
            assert_ne!(job.locked_by.as_deref(), Some("w1"));
        }
        assert_eq!(store.get(c.id).await.unwrap().locked_by.as_deref(), Some("w2"));
    }

    #[tokio::test]
    async fn test_concurrent_lock_attempts_yield_one_winner() {
        let store = Arc::new(MemStore::new());
        let job = store.insert(runnable_job()).await;

        let attempts = (0..32).map(|i| {
            let queue = queue_for(&store, &format!("worker-{i}"));
            let mut job = job.clone();
            async move { queue.lock_exclusively(&mut job).await.unwrap() }
        });

        let wins = join_all(attempts)
            .await
            .into_iter()
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }
}
