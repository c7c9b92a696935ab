//! Create job_targets table.

use sea_orm_migration::prelude::*;

use super::m20250801_000001_create_jobs::Job;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(JobTarget::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(JobTarget::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(JobTarget::JobId).uuid().not_null())
                    .col(ColumnDef::new(JobTarget::Arch).string().not_null())
                    .col(
                        ColumnDef::new(JobTarget::Status)
                            .string()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(JobTarget::Reason).string())
                    .col(
                        ColumnDef::new(JobTarget::Log)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(JobTarget::ExitCode)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(JobTarget::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(JobTarget::EndedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(JobTarget::Timeout).string())
                    .col(ColumnDef::new(JobTarget::Env).json())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_job_targets_job_id")
                            .from(JobTarget::Table, JobTarget::JobId)
                            .to(Job::Table, Job::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One row per (job, architecture).
        manager
            .create_index(
                Index::create()
                    .name("idx_job_targets_job_arch")
                    .table(JobTarget::Table)
                    .col(JobTarget::JobId)
                    .col(JobTarget::Arch)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(JobTarget::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum JobTarget {
    #[sea_orm(iden = "job_targets")]
    Table,
    Id,
    JobId,
    Arch,
    Status,
    Reason,
    Log,
    ExitCode,
    StartedAt,
    EndedAt,
    Timeout,
    Env,
}
