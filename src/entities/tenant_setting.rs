use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::{CreditPolicy, InvoiceQuantityPolicy};
use crate::tenancy::TenantScoped;

/// Per-company workflow policy. A missing row means the configured defaults.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tenant_settings")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub invoice_quantity_policy: InvoiceQuantityPolicy,
    #[sea_orm(column_type = "Decimal(Some((9, 4)))")]
    pub invoice_tolerance_percent: Decimal,
    #[sea_orm(column_type = "Decimal(Some((9, 4)))")]
    pub receipt_tolerance_percent: Decimal,
    pub credit_policy: CreditPolicy,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TenantScoped for Entity {
    const LABEL: &'static str = "tenant settings";

    fn id_column() -> Column {
        Column::Id
    }

    fn tenant_column() -> Column {
        Column::TenantId
    }

    fn company_column() -> Option<Column> {
        Some(Column::CompanyId)
    }

    fn version_column() -> Option<Column> {
        Some(Column::Version)
    }
}
