//! Repository traits and implementations.

pub mod job;

pub use job::{
    DurationKind, JobFilter, JobRecord, JobStore, NewJob, SqliteJobStore, StoreSettings,
};
