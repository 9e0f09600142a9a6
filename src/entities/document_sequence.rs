use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::DocumentType;
use crate::tenancy::TenantScoped;

/// Next number to hand out for one (tenant, document type) pair.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "document_sequences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub document_type: DocumentType,
    pub prefix: String,
    pub next_value: i64,
    pub version: i32,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

// Sequences are shared by all companies of a tenant.
impl TenantScoped for Entity {
    const LABEL: &'static str = "document sequence";

    fn id_column() -> Column {
        Column::Id
    }

    fn tenant_column() -> Column {
        Column::TenantId
    }

    fn version_column() -> Option<Column> {
        Some(Column::Version)
    }
}
