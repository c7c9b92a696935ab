//! Volatile in-process store backend.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Job;

use super::{JobStore, TargetUpdate};

/// In-memory job store. Jobs are lost when the process exits.
#[derive(Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn save_job(&self, job: &Job) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Job> {
        let jobs = self.jobs.read().await;
        jobs.get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let jobs = self.jobs.read().await;
        let mut all: Vec<Job> = jobs.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn update_target(&self, job_id: Uuid, arch: &str, update: TargetUpdate) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))?;

        let target = job
            .targets
            .iter_mut()
            .find(|t| t.arch == arch)
            .ok_or_else(|| AppError::NotFound(format!("Target {} for job {}", arch, job_id)))?;

        update.apply(target);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn recalculate_status(&self, job_id: Uuid) -> AppResult<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))?;

        job.recompute_status();
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}
