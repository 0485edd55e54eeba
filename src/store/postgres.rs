//! PostgreSQL-backed job store.
//!
//! Mutual exclusion across worker processes rests entirely on the
//! database's row-level atomicity: every claim is an `UPDATE ... WHERE`
//! that re-checks the freshness predicate at write time, and success is
//! judged purely by the modified-row count.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::db::AsyncDbPool;
use crate::error::{QueueError, QueueResult};
use crate::jobs::models::Job;
use crate::schema::jobs;
use crate::store::{CandidateQuery, JobStore};

#[derive(Clone)]
pub struct PgStore {
    pool: AsyncDbPool,
}

impl PgStore {
    pub fn new(pool: AsyncDbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn find_candidates(&self, query: &CandidateQuery) -> QueueResult<Vec<Job>> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let mut candidates = jobs::table
            .filter(jobs::failed_at.is_null())
            .filter(
                jobs::run_at
                    .le(query.now)
                    .and(
                        jobs::locked_at
                            .is_null()
                            .or(jobs::locked_at.lt(query.lock_cutoff)),
                    )
                    .or(jobs::locked_by.eq(query.worker.as_str())),
            )
            .order((jobs::priority.asc(), jobs::run_at.asc()))
            .limit(query.limit)
            .into_boxed();

        if let Some(floor) = query.min_priority {
            candidates = candidates.filter(jobs::priority.ge(floor));
        }
        if let Some(ceiling) = query.max_priority {
            candidates = candidates.filter(jobs::priority.le(ceiling));
        }

        candidates.load(&mut conn).await.map_err(QueueError::from)
    }

    async fn acquire_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
        lock_cutoff: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        diesel::update(
            jobs::table.filter(
                jobs::id
                    .eq(job_id)
                    .and(jobs::run_at.le(now))
                    .and(jobs::locked_at.is_null().or(jobs::locked_at.lt(lock_cutoff))),
            ),
        )
        .set((
            jobs::locked_at.eq(now),
            jobs::locked_by.eq(worker),
            jobs::last_run_at.eq(now),
            jobs::updated_at.eq(now),
        ))
        .execute(&mut conn)
        .await
        .map_err(QueueError::from)
    }

    async fn refresh_lock(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        diesel::update(jobs::table.filter(jobs::id.eq(job_id).and(jobs::locked_by.eq(worker))))
            .set((
                jobs::locked_at.eq(now),
                jobs::last_run_at.eq(now),
                jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(QueueError::from)
    }

    async fn mark_failed(
        &self,
        job_id: i32,
        worker: &str,
        now: NaiveDateTime,
    ) -> QueueResult<usize> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        diesel::update(jobs::table.filter(jobs::id.eq(job_id).and(jobs::locked_by.eq(worker))))
            .set((
                jobs::failed_at.eq(now),
                jobs::attempts.eq(jobs::attempts + 1),
                jobs::updated_at.eq(now),
            ))
            .execute(&mut conn)
            .await
            .map_err(QueueError::from)
    }

    async fn release_locks(&self, worker: &str) -> QueueResult<u64> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        let released = diesel::update(jobs::table.filter(jobs::locked_by.eq(worker)))
            .set((
                jobs::locked_at.eq(None::<NaiveDateTime>),
                jobs::locked_by.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await
            .map_err(QueueError::from)?;

        Ok(released as u64)
    }

    async fn current_time(&self) -> QueueResult<NaiveDateTime> {
        let mut conn = self
            .pool
            .get()
            .await
            .map_err(|e| QueueError::ConnectionPool {
                source: anyhow::Error::from(e),
            })?;

        diesel::select(diesel::dsl::now)
            .get_result(&mut conn)
            .await
            .map_err(QueueError::from)
    }
}
