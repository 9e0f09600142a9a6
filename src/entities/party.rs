use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use super::enums::PartyType;
use crate::tenancy::TenantScoped;

/// A customer or supplier together with its running balances.
///
/// `current_outstanding` and `overdue_amount` are only written by the balance
/// ledger; they never go negative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parties")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub code: String,
    pub name: String,
    pub party_type: PartyType,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub credit_limit: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub current_outstanding: Decimal,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub overdue_amount: Decimal,
    pub payment_term_days: i32,
    pub is_active: bool,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::party_obligation::Entity")]
    Obligations,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::party_obligation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Obligations.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TenantScoped for Entity {
    const LABEL: &'static str = "party";

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
