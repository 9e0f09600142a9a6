use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

use super::{check_version, today, Audited, ServiceDeps};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::PartyType;
use crate::entities::{
    delivery, goods_receipt, party, party_obligation, payment, purchase_invoice, purchase_order,
    sales_order,
};
use crate::errors::ServiceError;
use crate::ledger::{self, CreditCheck, PartyBalance, ReconciliationReport};
use crate::tenancy::{TenantContext, TenantGateway};
use crate::totals::MAX_AMOUNT;

fn validate_credit_limit(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("non_negative");
        err.message = Some("must not be negative".into());
        return Err(err);
    }
    if *value > MAX_AMOUNT {
        let mut err = ValidationError::new("out_of_range");
        err.message = Some("out of range".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateParty {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub party_type: PartyType,
    #[validate(custom = "validate_credit_limit")]
    #[serde(default)]
    pub credit_limit: Decimal,
    #[validate(range(min = 0, max = 3650))]
    #[serde(default)]
    pub payment_term_days: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateParty {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub party_type: Option<PartyType>,
    #[validate(custom = "validate_credit_limit")]
    pub credit_limit: Option<Decimal>,
    #[validate(range(min = 0, max = 3650))]
    pub payment_term_days: Option<i32>,
    pub is_active: Option<bool>,
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PartyRole {
    Customer,
    Supplier,
}

/// Loads a party that may take part in a new document in `role`.
pub(crate) async fn active_party<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    role: PartyRole,
) -> Result<party::Model, ServiceError> {
    let party = gw.get::<party::Entity>(party_id).await?;
    let (fits, label) = match role {
        PartyRole::Customer => (party.party_type.is_customer(), "customer"),
        PartyRole::Supplier => (party.party_type.is_supplier(), "supplier"),
    };
    if !fits {
        return Err(ServiceError::ValidationError(format!(
            "party {} is not a {}",
            party.code, label
        )));
    }
    if !party.is_active {
        return Err(ServiceError::ValidationError(format!(
            "party {} is inactive",
            party.code
        )));
    }
    Ok(party)
}

/// Customers and suppliers with their running balances.
#[derive(Clone)]
pub struct PartyService {
    deps: ServiceDeps,
}

impl PartyService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), code = %input.code))]
    pub async fn create(&self, ctx: &TenantContext, input: CreateParty) -> Result<party::Model, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "party.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let party = self.deps.committed(outcome);
        info!(party_id = %party.id, party_type = %party.party_type, "party created");
        Ok(party)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreateParty,
    ) -> Result<Audited<party::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let now = Utc::now();
        let party = gw
            .insert(party::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set(input.code.trim().to_string()),
                name: Set(input.name.clone()),
                party_type: Set(input.party_type),
                credit_limit: Set(input.credit_limit),
                current_outstanding: Set(Decimal::ZERO),
                overdue_amount: Set(Decimal::ZERO),
                payment_term_days: Set(input.payment_term_days),
                is_active: Set(true),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;
        let record = AuditRecord::new(ctx, "PARTY", party.id, AuditAction::Create).with_after(&party);
        Ok((party, vec![record]))
    }

    pub async fn get(&self, ctx: &TenantContext, party_id: Uuid) -> Result<party::Model, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .get::<party::Entity>(party_id)
            .await
    }

    pub async fn list(&self, ctx: &TenantContext) -> Result<Vec<party::Model>, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .all(party::Entity::find().order_by_asc(party::Column::Code))
            .await
    }

    /// Master data edits. Balances are owned by the ledger and cannot be set.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn update(
        &self,
        ctx: &TenantContext,
        party_id: Uuid,
        input: UpdateParty,
    ) -> Result<party::Model, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "party.update", || async move {
            let txn = self.deps.begin().await?;
            let result = self.update_in_txn(&txn, ctx, party_id, input).await;
            finish(txn, result).await
        })
        .await?;

        Ok(self.deps.committed(outcome))
    }

    async fn update_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        party_id: Uuid,
        input: &UpdateParty,
    ) -> Result<Audited<party::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let current = gw.get::<party::Entity>(party_id).await?;
        check_version(input.expected_version, "party", party_id, current.version)?;

        let mut update = party::ActiveModel {
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        if let Some(name) = &input.name {
            update.name = Set(name.clone());
        }
        if let Some(party_type) = input.party_type {
            update.party_type = Set(party_type);
        }
        if let Some(credit_limit) = input.credit_limit {
            update.credit_limit = Set(credit_limit);
        }
        if let Some(days) = input.payment_term_days {
            update.payment_term_days = Set(days);
        }
        if let Some(is_active) = input.is_active {
            update.is_active = Set(is_active);
        }

        let updated = gw
            .update::<party::Entity, _>(party_id, update, Some(current.version))
            .await?;
        let record = AuditRecord::new(ctx, "PARTY", party_id, AuditAction::Update)
            .with_before(&current)
            .with_after(&updated);
        Ok((updated, vec![record]))
    }

    /// Refused while the party owes or is owed money, or while any document
    /// still points at it.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn delete(&self, ctx: &TenantContext, party_id: Uuid) -> Result<(), ServiceError> {
        let outcome = with_retry(self.deps.retry, "party.delete", || async move {
            let txn = self.deps.begin().await?;
            let result = self.delete_in_txn(&txn, ctx, party_id).await;
            finish(txn, result).await
        })
        .await?;

        self.deps.committed(outcome);
        info!(%party_id, "party deleted");
        Ok(())
    }

    async fn delete_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        party_id: Uuid,
    ) -> Result<Audited<()>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let current = gw.get::<party::Entity>(party_id).await?;

        if current.current_outstanding > Decimal::ZERO || current.overdue_amount > Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "party {} has outstanding {} and overdue {}",
                current.code, current.current_outstanding, current.overdue_amount
            )));
        }
        if let Some(kind) = referencing_document(&gw, party_id).await? {
            return Err(ServiceError::Conflict(format!(
                "party {} is referenced by a {}",
                current.code, kind
            )));
        }

        gw.delete::<party::Entity>(party_id).await?;
        let record = AuditRecord::new(ctx, "PARTY", party_id, AuditAction::Delete).with_before(&current);
        Ok(((), vec![record]))
    }

    pub async fn balance(&self, ctx: &TenantContext, party_id: Uuid) -> Result<PartyBalance, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        ledger::balance::party_balance(&gw, party_id).await
    }

    /// Whether `pending` more would exceed the party's credit limit.
    pub async fn check_credit(
        &self,
        ctx: &TenantContext,
        party_id: Uuid,
        pending: Decimal,
    ) -> Result<CreditCheck, ServiceError> {
        let party = self.get(ctx, party_id).await?;
        Ok(ledger::check_credit(&party, pending))
    }

    /// Recomputes overdue amounts for every party of the caller's company.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn refresh_overdue(&self, ctx: &TenantContext, as_of: Option<NaiveDate>) -> Result<usize, ServiceError> {
        let as_of = as_of.unwrap_or_else(today);
        let changed = with_retry(self.deps.retry, "party.refresh_overdue", || async move {
            let txn = self.deps.begin().await?;
            let gw = TenantGateway::new(&txn, ctx);
            let result = ledger::balance::refresh_overdue(&gw, as_of).await;
            finish(txn, result).await
        })
        .await?;
        Ok(changed)
    }

    pub async fn reconcile(
        &self,
        ctx: &TenantContext,
        party_id: Uuid,
    ) -> Result<ReconciliationReport, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        ledger::balance::reconcile_party(&gw, party_id).await
    }
}

async fn referencing_document<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
) -> Result<Option<&'static str>, ServiceError> {
    if gw
        .one(sales_order::Entity::find().filter(sales_order::Column::CustomerId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("sales order"));
    }
    if gw
        .one(delivery::Entity::find().filter(delivery::Column::CustomerId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("delivery"));
    }
    if gw
        .one(purchase_order::Entity::find().filter(purchase_order::Column::SupplierId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("purchase order"));
    }
    if gw
        .one(goods_receipt::Entity::find().filter(goods_receipt::Column::SupplierId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("goods receipt"));
    }
    if gw
        .one(purchase_invoice::Entity::find().filter(purchase_invoice::Column::SupplierId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("purchase invoice"));
    }
    if gw
        .one(party_obligation::Entity::find().filter(party_obligation::Column::PartyId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("balance entry"));
    }
    if gw
        .one(payment::Entity::find().filter(payment::Column::PartyId.eq(party_id)))
        .await?
        .is_some()
    {
        return Ok(Some("payment"));
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn create_input_rejects_negative_limit() {
        let input = CreateParty {
            code: "C-1".into(),
            name: "Acme".into(),
            party_type: PartyType::Customer,
            credit_limit: dec!(-1),
            payment_term_days: 30,
        };
        assert!(input.validate().is_err());

        let input = CreateParty {
            credit_limit: Decimal::MAX,
            ..input
        };
        assert!(input.validate().is_err());

        let input = CreateParty {
            credit_limit: dec!(0),
            ..input
        };
        assert!(input.validate().is_ok());
    }

    #[test]
    fn update_input_checks_only_present_fields() {
        assert!(UpdateParty::default().validate().is_ok());
        let input = UpdateParty {
            payment_term_days: Some(-3),
            ..Default::default()
        };
        assert!(input.validate().is_err());
    }
}
