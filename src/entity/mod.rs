//! SeaORM entity definitions for the SQLite database.

pub mod job;
pub mod job_target;
