//! Job entity for SeaORM.

use sea_orm::entity::prelude::*;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub repo: String,
    pub commit_hash: String,
    pub test_command: String,
    /// Requested architecture list (JSON array of strings).
    #[sea_orm(column_type = "Json")]
    pub architectures: JsonValue,
    pub status: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub started_at: Option<DateTimeUtc>,
    pub ended_at: Option<DateTimeUtc>,
    pub timeout: Option<String>,
    /// Job-wide environment variables (JSON object).
    #[sea_orm(column_type = "Json", nullable)]
    pub env: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::job_target::Entity")]
    JobTargets,
}

impl Related<super::job_target::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::JobTargets.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
