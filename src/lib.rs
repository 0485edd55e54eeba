//! relay-rs
//!
//! Coordination core for a persistent, multi-worker job queue on
//! PostgreSQL. Workers poll a shared `jobs` table for claimable work and
//! take exclusive ownership through atomic conditional updates: the
//! database's row-level atomicity is the only mutual-exclusion mechanism,
//! with no external lock manager. Recurring jobs carry a period, an
//! optional time-of-day constraint, and an optional expiry.
//!
//! Abandoned locks are reclaimed by wall-clock age: a lock older than the
//! configured `max_run_time` may be stolen by another worker, so that knob
//! must exceed the worst-case job runtime.

pub mod config;
pub mod db;
pub mod error;
pub mod jobs;
pub mod queue;
pub mod schema;
pub mod store;
pub mod worker;

pub use config::WorkerSettings;
pub use error::{QueueError, QueueResult};
pub use jobs::{Job, NewJob, TimeSpec, TimeSpecError};
pub use queue::JobQueue;
pub use store::{CandidateQuery, JobStore, MemStore, PgStore};
pub use worker::{JobHandler, Worker};
