use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::tenancy::TenantScoped;

/// Audit records persisted by the database audit sink.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_logs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: String,
    pub actor: Uuid,
    pub before: Option<Json>,
    pub after: Option<Json>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TenantScoped for Entity {
    const LABEL: &'static str = "audit log entry";

    fn id_column() -> Column {
        Column::Id
    }

    fn tenant_column() -> Column {
        Column::TenantId
    }

    fn company_column() -> Option<Column> {
        Some(Column::CompanyId)
    }
}
