use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::schema::jobs;

/// A persisted unit of work and its scheduling metadata.
///
/// `locked_at`/`locked_by` form the lease: both null means unlocked, both
/// non-null means some worker holds the job. `failed_at` non-null removes the
/// job from scheduling permanently. `period`/`at`/`stop_at` describe
/// recurrence; a job with null `period` is one-shot.
#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = jobs)]
pub struct Job {
    pub id: i32,
    pub name: Option<String>,
    pub priority: i32,
    pub attempts: i32,
    pub run_at: NaiveDateTime,
    pub locked_at: Option<NaiveDateTime>,
    pub locked_by: Option<String>,
    pub failed_at: Option<NaiveDateTime>,
    pub last_run_at: Option<NaiveDateTime>,
    pub period: Option<i32>,
    pub at: Option<String>,
    pub stop_at: Option<NaiveDateTime>,
    pub payload: Option<JsonValue>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Job {
    /// Whether this job recurs instead of running once.
    pub fn is_periodic(&self) -> bool {
        self.period.is_some()
    }

    /// Whether some worker currently holds the lease.
    pub fn is_locked(&self) -> bool {
        self.locked_at.is_some()
    }

    /// Whether the given worker identity holds the lease.
    pub fn locked_by_worker(&self, worker: &str) -> bool {
        self.locked_by.as_deref() == Some(worker)
    }
}

#[derive(Debug, Default, Insertable)]
#[diesel(table_name = jobs)]
pub struct NewJob {
    pub name: Option<String>,
    pub priority: i32,
    pub run_at: Option<NaiveDateTime>,
    pub last_run_at: Option<NaiveDateTime>,
    pub period: Option<i32>,
    pub at: Option<String>,
    pub stop_at: Option<NaiveDateTime>,
    pub payload: Option<JsonValue>,
}
