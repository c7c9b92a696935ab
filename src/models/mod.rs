//! Domain models for the multi-arch test harness.

pub mod job;

// Re-export commonly used types
pub use job::{
    CreateJobRequest, CreateJobResponse, FailureReason, Job, JobStatus, JobTarget, JobTargetView,
    JobView, ListJobsQuery, TargetStatus, MAX_TARGET_LOG_PREVIEW, TIMEOUT_EXIT_CODE,
};
