//! Concurrent per-architecture job dispatch.
//!
//! One independent execution unit per target, fan-out unbounded by design.
//! Units share no execution-time state; they rendezvous only through the
//! store.

pub mod classify;
pub mod docker;

pub use classify::{classify, Verdict};
pub use docker::{DockerExecutor, ExecutionRequest, RunError, RunOutcome, TargetExecutor};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use crate::config::{parse_duration, Config};
use crate::models::Job;
use crate::store::{JobStore, TargetUpdate};

/// Dispatcher settings taken from process configuration.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Image name prefix; the architecture becomes the tag.
    pub image_prefix: String,
    /// Deadline when neither the target nor the job declares one.
    pub default_timeout: Duration,
}

impl RunnerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            image_prefix: config.runner_image.clone(),
            default_timeout: config.default_timeout,
        }
    }
}

/// Fans a submitted job out into one execution unit per target.
pub struct Runner {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn TargetExecutor>,
    config: RunnerConfig,
}

impl Runner {
    pub fn new(
        store: Arc<dyn JobStore>,
        executor: Arc<dyn TargetExecutor>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            config,
        }
    }

    /// Start one execution unit per target and return immediately.
    ///
    /// Fire-and-forget: the caller learns about acceptance, not completion.
    /// A unit's failure or timeout never affects its siblings.
    pub fn submit(&self, job: &Job) {
        for target in &job.targets {
            let store = Arc::clone(&self.store);
            let executor = Arc::clone(&self.executor);
            let config = self.config.clone();
            let job = job.clone();
            let arch = target.arch.clone();
            tokio::spawn(async move {
                run_target(store, executor, config, job, arch).await;
            });
        }
    }
}

/// Drive a single target from pending to a terminal state.
///
/// Every store write goes through the atomic command interface; the job and
/// target values held here are snapshots and never mutated directly.
async fn run_target(
    store: Arc<dyn JobStore>,
    executor: Arc<dyn TargetExecutor>,
    config: RunnerConfig,
    job: Job,
    arch: String,
) {
    let job_id = job.id;
    let target = match job.target(&arch) {
        Some(target) => target.clone(),
        None => {
            error!(job_id = %job_id, arch = %arch, "submitted job has no such target");
            return;
        }
    };

    let update = TargetUpdate::MarkRunning {
        started_at: Utc::now(),
    };
    if let Err(e) = store.update_target(job_id, &arch, update).await {
        error!(job_id = %job_id, arch = %arch, error = %e, "failed to mark target running");
        return;
    }
    if let Err(e) = store.recalculate_status(job_id).await {
        error!(job_id = %job_id, arch = %arch, error = %e, "failed to recalculate job status");
    }

    info!(job_id = %job_id, arch = %arch, phase = "provision", "target started");

    let request = ExecutionRequest {
        image: format!("{}:{}", config.image_prefix, arch),
        repo: job.repo.clone(),
        commit: job.commit.clone(),
        test_command: job.test_command.clone(),
        env: merged_env(&job.env, &target.env),
        deadline: effective_deadline(
            target.timeout.as_deref(),
            job.timeout.as_deref(),
            config.default_timeout,
        ),
    };

    info!(
        job_id = %job_id,
        arch = %arch,
        phase = "docker_run",
        image = %request.image,
        "invoking container runtime"
    );

    let outcome = executor.run(&request).await;
    let verdict = classify(&outcome);

    let update = TargetUpdate::MarkFinished {
        status: verdict.status,
        reason: verdict.reason,
        exit_code: verdict.exit_code,
        log: outcome.log,
        ended_at: Utc::now(),
    };
    if let Err(e) = store.update_target(job_id, &arch, update).await {
        error!(job_id = %job_id, arch = %arch, error = %e, "failed to persist target result");
        return;
    }
    if let Err(e) = store.recalculate_status(job_id).await {
        error!(job_id = %job_id, arch = %arch, error = %e, "failed to recalculate job status");
    }

    info!(
        job_id = %job_id,
        arch = %arch,
        phase = "done",
        status = %verdict.status,
        exit_code = verdict.exit_code,
        "target finished"
    );
}

/// Target deadline: target override, else job timeout, else process default.
/// Unparseable values fall through to the next source.
fn effective_deadline(
    target_timeout: Option<&str>,
    job_timeout: Option<&str>,
    default: Duration,
) -> Duration {
    target_timeout
        .and_then(parse_duration)
        .or_else(|| job_timeout.and_then(parse_duration))
        .unwrap_or(default)
}

/// Job env with per-target overrides layered on top.
fn merged_env(
    job_env: &HashMap<String, String>,
    target_env: &HashMap<String, String>,
) -> HashMap<String, String> {
    let mut env = job_env.clone();
    env.extend(target_env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}
