//! Durable store backend on SQLite via SeaORM.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entity::{job, job_target};
use crate::error::{AppError, AppResult};
use crate::models::{FailureReason, Job, JobStatus, JobTarget, TargetStatus};

use super::{JobStore, TargetUpdate};

/// Database-backed job store.
#[derive(Clone)]
pub struct DatabaseStore {
    pool: DbPool,
}

impl DatabaseStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for DatabaseStore {
    async fn save_job(&self, job: &Job) -> AppResult<()> {
        let txn = self.pool.connection().begin().await?;

        // Full upsert: replace any previous rows for this job id.
        job_target::Entity::delete_many()
            .filter(job_target::Column::JobId.eq(job.id))
            .exec(&txn)
            .await?;
        job::Entity::delete_by_id(job.id).exec(&txn).await?;

        job::Entity::insert(job_to_active(job)?).exec(&txn).await?;

        let targets = job
            .targets
            .iter()
            .map(|t| target_to_active(job.id, t))
            .collect::<AppResult<Vec<_>>>()?;
        if !targets.is_empty() {
            job_target::Entity::insert_many(targets).exec(&txn).await?;
        }

        txn.commit().await?;
        Ok(())
    }

    async fn get_job(&self, id: Uuid) -> AppResult<Job> {
        let conn = self.pool.connection();

        let model = job::Entity::find_by_id(id)
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", id)))?;

        let targets = job_target::Entity::find()
            .filter(job_target::Column::JobId.eq(id))
            .order_by_asc(job_target::Column::Id)
            .all(conn)
            .await?;

        job_from_models(model, targets)
    }

    async fn list_jobs(&self) -> AppResult<Vec<Job>> {
        let conn = self.pool.connection();

        let rows = job::Entity::find()
            .find_with_related(job_target::Entity)
            .order_by_desc(job::Column::CreatedAt)
            .order_by_asc(job_target::Column::Id)
            .all(conn)
            .await?;

        rows.into_iter()
            .map(|(model, targets)| job_from_models(model, targets))
            .collect()
    }

    async fn update_target(&self, job_id: Uuid, arch: &str, update: TargetUpdate) -> AppResult<()> {
        let txn = self.pool.connection().begin().await?;

        let job_row = job::Entity::find_by_id(job_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))?;

        let target_row = job_target::Entity::find()
            .filter(job_target::Column::JobId.eq(job_id))
            .filter(job_target::Column::Arch.eq(arch))
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Target {} for job {}", arch, job_id)))?;

        let mut target = target_from_model(&target_row)?;
        update.apply(&mut target);

        // Only the named target row is rewritten; sibling targets are
        // untouched by this transaction.
        let mut active: job_target::ActiveModel = target_row.into();
        active.status = Set(target.status.as_str().to_string());
        active.reason = Set(target.reason.map(|r| r.as_str().to_string()));
        active.exit_code = Set(target.exit_code);
        active.log = Set(target.log);
        active.started_at = Set(target.started_at);
        active.ended_at = Set(target.ended_at);
        active.update(&txn).await?;

        let mut job_active: job::ActiveModel = job_row.into();
        job_active.updated_at = Set(Utc::now());
        job_active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn recalculate_status(&self, job_id: Uuid) -> AppResult<()> {
        let txn = self.pool.connection().begin().await?;

        let job_row = job::Entity::find_by_id(job_id)
            .one(&txn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Job {}", job_id)))?;

        let target_rows = job_target::Entity::find()
            .filter(job_target::Column::JobId.eq(job_id))
            .order_by_asc(job_target::Column::Id)
            .all(&txn)
            .await?;

        let mut domain = job_from_models(job_row.clone(), target_rows)?;
        domain.recompute_status();

        // Persist only the derived job-row fields; target rows stay owned by
        // update_target.
        let mut active: job::ActiveModel = job_row.into();
        active.status = Set(domain.status.as_str().to_string());
        active.started_at = Set(domain.started_at);
        active.ended_at = Set(domain.ended_at);
        active.updated_at = Set(domain.updated_at);
        active.update(&txn).await?;

        txn.commit().await?;
        Ok(())
    }

    async fn ping(&self) -> AppResult<()> {
        self.pool.ping().await
    }
}

// ============================================================================
// Row <-> domain conversions
// ============================================================================

fn job_to_active(j: &Job) -> AppResult<job::ActiveModel> {
    Ok(job::ActiveModel {
        id: Set(j.id),
        repo: Set(j.repo.clone()),
        commit_hash: Set(j.commit.clone()),
        test_command: Set(j.test_command.clone()),
        architectures: Set(serde_json::to_value(&j.architectures)?),
        status: Set(j.status.as_str().to_string()),
        created_at: Set(j.created_at),
        updated_at: Set(j.updated_at),
        started_at: Set(j.started_at),
        ended_at: Set(j.ended_at),
        timeout: Set(j.timeout.clone()),
        env: Set(if j.env.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&j.env)?)
        }),
    })
}

fn target_to_active(job_id: Uuid, t: &JobTarget) -> AppResult<job_target::ActiveModel> {
    Ok(job_target::ActiveModel {
        id: sea_orm::ActiveValue::NotSet,
        job_id: Set(job_id),
        arch: Set(t.arch.clone()),
        status: Set(t.status.as_str().to_string()),
        reason: Set(t.reason.map(|r| r.as_str().to_string())),
        log: Set(t.log.clone()),
        exit_code: Set(t.exit_code),
        started_at: Set(t.started_at),
        ended_at: Set(t.ended_at),
        timeout: Set(t.timeout.clone()),
        env: Set(if t.env.is_empty() {
            None
        } else {
            Some(serde_json::to_value(&t.env)?)
        }),
    })
}

fn job_from_models(model: job::Model, target_rows: Vec<job_target::Model>) -> AppResult<Job> {
    let status = JobStatus::parse(&model.status)
        .ok_or_else(|| AppError::Database(format!("Invalid job status '{}'", model.status)))?;

    let architectures: Vec<String> = serde_json::from_value(model.architectures)?;
    let env = match model.env {
        Some(value) => serde_json::from_value(value)?,
        None => Default::default(),
    };

    let targets = target_rows
        .iter()
        .map(target_from_model)
        .collect::<AppResult<Vec<_>>>()?;

    Ok(Job {
        id: model.id,
        repo: model.repo,
        commit: model.commit_hash,
        test_command: model.test_command,
        architectures,
        status,
        targets,
        created_at: model.created_at,
        updated_at: model.updated_at,
        started_at: model.started_at,
        ended_at: model.ended_at,
        timeout: model.timeout,
        env,
    })
}

fn target_from_model(model: &job_target::Model) -> AppResult<JobTarget> {
    let status = TargetStatus::parse(&model.status)
        .ok_or_else(|| AppError::Database(format!("Invalid target status '{}'", model.status)))?;

    let reason = match model.reason.as_deref() {
        Some(s) if !s.is_empty() => Some(FailureReason::parse(s).ok_or_else(|| {
            AppError::Database(format!("Invalid target failure reason '{}'", s))
        })?),
        _ => None,
    };

    let env = match &model.env {
        Some(value) => serde_json::from_value(value.clone())?,
        None => Default::default(),
    };

    Ok(JobTarget {
        arch: model.arch.clone(),
        status,
        reason,
        log: model.log.clone(),
        exit_code: model.exit_code,
        started_at: model.started_at,
        ended_at: model.ended_at,
        timeout: model.timeout.clone(),
        env,
    })
}
