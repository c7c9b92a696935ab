//! Job domain models and DTOs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Exit code recorded when a target's deadline expired before the process
/// reported one.
pub const TIMEOUT_EXIT_CODE: i32 = -2;

/// Aggregate job status, derived from the target statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Job created, no target has started yet.
    Pending,
    /// At least one target is still pending or running.
    Running,
    /// Every target passed.
    Passed,
    /// No target is still active and at least one failed or errored.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-architecture execution status.
///
/// `pending -> running -> {passed | failed | error}`; terminal states are
/// never re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Pending,
    Running,
    Passed,
    /// The test command failed or the deadline expired.
    Failed,
    /// Infrastructure failure (runtime unreachable, image missing, repo auth).
    Error,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "running" => Some(Self::Running),
            "passed" => Some(Self::Passed),
            "failed" => Some(Self::Failed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stable reason code explaining why a target reached a failing or erroring
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Timeout,
    DockerImageMissing,
    DockerDaemonError,
    GitAuthError,
    GitCloneFailed,
    TestsFailed,
    DockerError,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::DockerImageMissing => "docker_image_missing",
            Self::DockerDaemonError => "docker_daemon_error",
            Self::GitAuthError => "git_auth_error",
            Self::GitCloneFailed => "git_clone_failed",
            Self::TestsFailed => "tests_failed",
            Self::DockerError => "docker_error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timeout" => Some(Self::Timeout),
            "docker_image_missing" => Some(Self::DockerImageMissing),
            "docker_daemon_error" => Some(Self::DockerDaemonError),
            "git_auth_error" => Some(Self::GitAuthError),
            "git_clone_failed" => Some(Self::GitCloneFailed),
            "tests_failed" => Some(Self::TestsFailed),
            "docker_error" => Some(Self::DockerError),
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Execution of a job's test command for one architecture.
///
/// Owned exclusively by its parent [`Job`]; never shared across jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobTarget {
    pub arch: String,
    pub status: TargetStatus,
    /// None until the target reaches a failing or erroring terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    /// Combined stdout/stderr captured from the container run.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub log: String,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Per-target deadline override, e.g. "30s", "5m".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Per-target env overrides, merged over the job env.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl JobTarget {
    pub fn pending(arch: impl Into<String>) -> Self {
        Self {
            arch: arch.into(),
            status: TargetStatus::Pending,
            reason: None,
            log: String::new(),
            exit_code: 0,
            started_at: None,
            ended_at: None,
            timeout: None,
            env: HashMap::new(),
        }
    }
}

/// One submitted multi-architecture test request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub repo: String,
    pub commit: String,
    pub test_command: String,
    pub architectures: Vec<String>,
    pub status: JobStatus,
    pub targets: Vec<JobTarget>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Job-wide deadline per target, e.g. "5m". Targets may override it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
}

impl Job {
    /// Create a new pending job with one pending target per architecture.
    pub fn new(
        id: Uuid,
        repo: impl Into<String>,
        commit: impl Into<String>,
        test_command: impl Into<String>,
        architectures: Vec<String>,
        timeout: Option<String>,
        env: HashMap<String, String>,
    ) -> Self {
        let now = Utc::now();
        let targets = architectures.iter().map(JobTarget::pending).collect();
        Self {
            id,
            repo: repo.into(),
            commit: commit.into(),
            test_command: test_command.into(),
            architectures,
            status: JobStatus::Pending,
            targets,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            timeout,
            env,
        }
    }

    /// Find a target by architecture.
    pub fn target(&self, arch: &str) -> Option<&JobTarget> {
        self.targets.iter().find(|t| t.arch == arch)
    }

    /// Recompute the aggregate status and derived timestamps from the targets.
    ///
    /// Evaluation order is significant: any pending/running target dominates,
    /// then any failed/error target, then all-passed. An empty target set
    /// stays pending. `started_at`/`ended_at` are fully recomputed as the
    /// min/max of the non-null target timestamps, and `updated_at` is stamped.
    pub fn recompute_status(&mut self) {
        let mut any_active = false;
        let mut any_failed_or_error = false;

        for t in &self.targets {
            match t.status {
                TargetStatus::Pending | TargetStatus::Running => any_active = true,
                TargetStatus::Failed | TargetStatus::Error => any_failed_or_error = true,
                TargetStatus::Passed => {}
            }
        }

        self.status = if any_active {
            JobStatus::Running
        } else if any_failed_or_error {
            JobStatus::Failed
        } else if !self.targets.is_empty() {
            JobStatus::Passed
        } else {
            JobStatus::Pending
        };

        self.started_at = self.targets.iter().filter_map(|t| t.started_at).min();
        self.ended_at = self.targets.iter().filter_map(|t| t.ended_at).max();
        self.updated_at = Utc::now();
    }
}

// ============================================================================
// API request/response DTOs
// ============================================================================

/// Request body for creating a job.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    /// Clone URL of the repository under test.
    pub repo: String,
    /// Commit to check out; the default branch head when empty.
    #[serde(default)]
    pub commit: String,
    /// Command executed inside the repository working directory.
    pub test_command: String,
    /// Target CPU architectures, one container run each.
    pub architectures: Vec<String>,
    /// Per-target deadline, e.g. "30s", "5m".
    #[serde(default)]
    pub timeout: Option<String>,
    /// Environment variables passed into every container run.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// Response body after job creation.
#[derive(Debug, Serialize, ToSchema)]
pub struct CreateJobResponse {
    pub id: Uuid,
}

/// Query parameters for listing jobs.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ListJobsQuery {
    /// Only return jobs with this aggregate status.
    pub status: Option<JobStatus>,
}

/// Log preview length in the job views. The full log stays available from
/// the per-target log endpoint.
pub const MAX_TARGET_LOG_PREVIEW: usize = 512;

/// Target as rendered in job views, with the log truncated to a preview.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobTargetView {
    pub arch: String,
    pub status: TargetStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
}

impl From<&JobTarget> for JobTargetView {
    fn from(t: &JobTarget) -> Self {
        let log = if t.log.is_empty() {
            None
        } else if t.log.chars().count() > MAX_TARGET_LOG_PREVIEW {
            let preview: String = t.log.chars().take(MAX_TARGET_LOG_PREVIEW).collect();
            Some(format!("{}...(truncated)", preview))
        } else {
            Some(t.log.clone())
        };

        Self {
            arch: t.arch.clone(),
            status: t.status,
            reason: t.reason,
            exit_code: t.exit_code,
            started_at: t.started_at,
            ended_at: t.ended_at,
            log,
        }
    }
}

/// Job as rendered by the list/detail endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct JobView {
    pub id: Uuid,
    pub repo: String,
    pub commit: String,
    pub test_command: String,
    pub architectures: Vec<String>,
    pub status: JobStatus,
    pub targets: Vec<JobTargetView>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id,
            repo: job.repo.clone(),
            commit: job.commit.clone(),
            test_command: job.test_command.clone(),
            architectures: job.architectures.clone(),
            status: job.status,
            targets: job.targets.iter().map(JobTargetView::from).collect(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            started_at: job.started_at,
            ended_at: job.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job_with_statuses(statuses: &[TargetStatus]) -> Job {
        let archs: Vec<String> = (0..statuses.len()).map(|i| format!("arch{}", i)).collect();
        let mut job = Job::new(
            Uuid::now_v7(),
            "https://example.com/repo.git",
            "",
            "make test",
            archs,
            None,
            HashMap::new(),
        );
        for (t, s) in job.targets.iter_mut().zip(statuses) {
            t.status = *s;
        }
        job
    }

    #[test]
    fn test_any_active_target_dominates() {
        use TargetStatus::*;
        for active in [Pending, Running] {
            let mut job = job_with_statuses(&[Passed, Failed, active]);
            job.recompute_status();
            assert_eq!(job.status, JobStatus::Running);
        }
    }

    #[test]
    fn test_failure_dominates_once_all_settled() {
        use TargetStatus::*;
        for bad in [Failed, Error] {
            let mut job = job_with_statuses(&[Passed, bad, Passed]);
            job.recompute_status();
            assert_eq!(job.status, JobStatus::Failed);
        }
    }

    #[test]
    fn test_all_passed() {
        use TargetStatus::*;
        let mut job = job_with_statuses(&[Passed, Passed]);
        job.recompute_status();
        assert_eq!(job.status, JobStatus::Passed);
    }

    #[test]
    fn test_empty_target_set_stays_pending() {
        let mut job = job_with_statuses(&[]);
        job.recompute_status();
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn test_derived_timestamps_are_min_and_max() {
        let mut job = job_with_statuses(&[TargetStatus::Passed, TargetStatus::Passed]);
        let early = Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2025, 6, 1, 10, 5, 0).unwrap();
        job.targets[0].started_at = Some(late);
        job.targets[0].ended_at = Some(late);
        job.targets[1].started_at = Some(early);
        job.targets[1].ended_at = Some(early);

        job.recompute_status();
        assert_eq!(job.started_at, Some(early));
        assert_eq!(job.ended_at, Some(late));
    }

    #[test]
    fn test_timestamps_stay_null_before_any_start() {
        let mut job = job_with_statuses(&[TargetStatus::Pending, TargetStatus::Pending]);
        job.recompute_status();
        assert_eq!(job.started_at, None);
        assert_eq!(job.ended_at, None);
    }

    #[test]
    fn test_status_round_trips_through_strings() {
        for s in ["pending", "running", "passed", "failed"] {
            assert_eq!(JobStatus::parse(s).unwrap().as_str(), s);
        }
        for s in ["pending", "running", "passed", "failed", "error"] {
            assert_eq!(TargetStatus::parse(s).unwrap().as_str(), s);
        }
        for s in [
            "timeout",
            "docker_image_missing",
            "docker_daemon_error",
            "git_auth_error",
            "git_clone_failed",
            "tests_failed",
            "docker_error",
        ] {
            assert_eq!(FailureReason::parse(s).unwrap().as_str(), s);
        }
        assert_eq!(JobStatus::parse("bogus"), None);
    }

    #[test]
    fn test_log_preview_truncation() {
        let mut target = JobTarget::pending("amd64");
        target.log = "x".repeat(MAX_TARGET_LOG_PREVIEW + 100);
        let view = JobTargetView::from(&target);
        let preview = view.log.unwrap();
        assert!(preview.ends_with("...(truncated)"));
        assert_eq!(
            preview.chars().count(),
            MAX_TARGET_LOG_PREVIEW + "...(truncated)".chars().count()
        );

        target.log = "short".to_string();
        let view = JobTargetView::from(&target);
        assert_eq!(view.log.as_deref(), Some("short"));

        target.log = String::new();
        let view = JobTargetView::from(&target);
        assert_eq!(view.log, None);
    }
}
