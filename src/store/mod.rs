//! Authoritative job/target state behind an injectable trait boundary.
//!
//! Two interchangeable backends exist: [`MemoryStore`] and [`DatabaseStore`].
//! Callers must not be able to observe which one is active, including error
//! conditions.

pub mod database;
pub mod memory;

pub use database::DatabaseStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{FailureReason, Job, JobTarget, TargetStatus};

/// Named mutation commands applied to a single target inside the store's
/// atomic section.
///
/// A closed command set instead of a caller-supplied closure keeps the
/// mutation surface enumerable and the store's locking internal.
#[derive(Debug, Clone)]
pub enum TargetUpdate {
    /// Transition the target to running and stamp its start time.
    MarkRunning { started_at: DateTime<Utc> },
    /// Write the terminal result of one execution unit.
    MarkFinished {
        status: TargetStatus,
        reason: Option<FailureReason>,
        exit_code: i32,
        log: String,
        ended_at: DateTime<Utc>,
    },
}

impl TargetUpdate {
    /// Apply the command to a target in place.
    pub fn apply(&self, target: &mut JobTarget) {
        match self {
            TargetUpdate::MarkRunning { started_at } => {
                target.status = TargetStatus::Running;
                target.started_at = Some(*started_at);
            }
            TargetUpdate::MarkFinished {
                status,
                reason,
                exit_code,
                log,
                ended_at,
            } => {
                target.status = *status;
                target.reason = *reason;
                target.exit_code = *exit_code;
                target.log = log.clone();
                target.ended_at = Some(*ended_at);
            }
        }
    }
}

/// Storage for jobs and their targets.
///
/// `update_target` and `recalculate_status` are atomic with respect to each
/// other on the same job: concurrent mutations of different targets must both
/// land, and a reader must never observe a torn record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Idempotent full upsert of a job and its targets.
    async fn save_job(&self, job: &Job) -> AppResult<()>;

    /// Fetch one job. Fails with NotFound if absent.
    async fn get_job(&self, id: Uuid) -> AppResult<Job>;

    /// All jobs, newest first.
    async fn list_jobs(&self) -> AppResult<Vec<Job>>;

    /// Atomically apply `update` to the target identified by architecture.
    /// Fails with NotFound if the job or the target does not exist.
    async fn update_target(&self, job_id: Uuid, arch: &str, update: TargetUpdate) -> AppResult<()>;

    /// Recompute and persist the job's aggregate status from its targets.
    /// Fails with NotFound if the job does not exist.
    async fn recalculate_status(&self, job_id: Uuid) -> AppResult<()>;

    /// Backend connectivity probe for the readiness endpoint.
    async fn ping(&self) -> AppResult<()>;
}
