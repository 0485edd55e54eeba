//! Job records and recurrence evaluation.

pub mod models;
pub mod recurrence;

pub use models::{Job, NewJob};
pub use recurrence::{TimeSpec, TimeSpecError, is_due, parse_time_spec};
