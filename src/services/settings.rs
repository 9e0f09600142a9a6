use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, ConnectionTrait, DatabaseTransaction, EntityTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{check_version, Audited, ServiceDeps};
use crate::audit::{AuditAction, AuditRecord};
use crate::config::AppConfig;
use crate::db::{finish, with_retry};
use crate::entities::enums::{CreditPolicy, InvoiceQuantityPolicy};
use crate::entities::tenant_setting;
use crate::errors::ServiceError;
use crate::ledger::QuantityPolicy;
use crate::tenancy::{TenantContext, TenantGateway};

/// Deployment-wide fallbacks for tenants without a settings row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkflowDefaults {
    pub quantity: QuantityPolicy,
    pub credit_policy: CreditPolicy,
    pub document_number_width: usize,
}

impl Default for WorkflowDefaults {
    fn default() -> Self {
        Self {
            quantity: QuantityPolicy::default(),
            credit_policy: CreditPolicy::Advisory,
            document_number_width: 6,
        }
    }
}

impl From<&AppConfig> for WorkflowDefaults {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            quantity: QuantityPolicy {
                mode: cfg.default_invoice_quantity_policy,
                invoice_tolerance_percent: cfg.default_invoice_tolerance_percent,
                receipt_tolerance_percent: cfg.default_receipt_tolerance_percent,
            },
            credit_policy: cfg.default_credit_policy,
            document_number_width: cfg.document_number_width,
        }
    }
}

/// Policies in force for one tenant and company.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EffectiveSettings {
    pub quantity: QuantityPolicy,
    pub credit_policy: CreditPolicy,
    /// False when the deployment defaults apply.
    pub customized: bool,
}

impl From<&tenant_setting::Model> for EffectiveSettings {
    fn from(row: &tenant_setting::Model) -> Self {
        Self {
            quantity: QuantityPolicy {
                mode: row.invoice_quantity_policy,
                invoice_tolerance_percent: row.invoice_tolerance_percent,
                receipt_tolerance_percent: row.receipt_tolerance_percent,
            },
            credit_policy: row.credit_policy,
            customized: true,
        }
    }
}

pub(crate) async fn effective_settings<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    defaults: &WorkflowDefaults,
) -> Result<EffectiveSettings, ServiceError> {
    let row = gw.one(tenant_setting::Entity::find()).await?;
    Ok(match row {
        Some(row) => EffectiveSettings::from(&row),
        None => EffectiveSettings {
            quantity: defaults.quantity,
            credit_policy: defaults.credit_policy,
            customized: false,
        },
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct UpdateSettings {
    pub invoice_quantity_policy: InvoiceQuantityPolicy,
    #[validate(custom = "crate::config::validate_percent")]
    pub invoice_tolerance_percent: Decimal,
    #[validate(custom = "crate::config::validate_percent")]
    pub receipt_tolerance_percent: Decimal,
    pub credit_policy: CreditPolicy,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Clone)]
pub struct SettingsService {
    deps: ServiceDeps,
}

impl SettingsService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn get(&self, ctx: &TenantContext) -> Result<EffectiveSettings, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        effective_settings(&gw, &self.deps.defaults).await
    }

    /// Creates or replaces the settings row of the caller's company.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn update(
        &self,
        ctx: &TenantContext,
        input: UpdateSettings,
    ) -> Result<tenant_setting::Model, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "settings.update", || async move {
            let txn = self.deps.begin().await?;
            let result = self.update_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let row = self.deps.committed(outcome);
        info!(
            invoice_policy = %row.invoice_quantity_policy,
            credit_policy = %row.credit_policy,
            "tenant settings updated"
        );
        Ok(row)
    }

    async fn update_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &UpdateSettings,
    ) -> Result<Audited<tenant_setting::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let now = Utc::now();

        match gw.one(tenant_setting::Entity::find()).await? {
            Some(current) => {
                check_version(input.expected_version, "tenant settings", current.id, current.version)?;
                let update = tenant_setting::ActiveModel {
                    invoice_quantity_policy: Set(input.invoice_quantity_policy),
                    invoice_tolerance_percent: Set(input.invoice_tolerance_percent),
                    receipt_tolerance_percent: Set(input.receipt_tolerance_percent),
                    credit_policy: Set(input.credit_policy),
                    updated_at: Set(now),
                    ..Default::default()
                };
                let updated = gw
                    .update::<tenant_setting::Entity, _>(current.id, update, Some(current.version))
                    .await?;
                let record = AuditRecord::new(ctx, "TENANT_SETTINGS", updated.id, AuditAction::Update)
                    .with_before(&current)
                    .with_after(&updated);
                Ok((updated, vec![record]))
            }
            None => {
                let created = gw
                    .insert(tenant_setting::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        invoice_quantity_policy: Set(input.invoice_quantity_policy),
                        invoice_tolerance_percent: Set(input.invoice_tolerance_percent),
                        receipt_tolerance_percent: Set(input.receipt_tolerance_percent),
                        credit_policy: Set(input.credit_policy),
                        version: Set(1),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    })
                    .await?;
                let record = AuditRecord::new(ctx, "TENANT_SETTINGS", created.id, AuditAction::Create)
                    .with_after(&created);
                Ok((created, vec![record]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_follow_config() {
        let mut cfg = AppConfig::new("sqlite::memory:".into(), "test".into());
        cfg.default_invoice_quantity_policy = InvoiceQuantityPolicy::Received;
        cfg.default_invoice_tolerance_percent = dec!(5);
        cfg.default_credit_policy = CreditPolicy::Enforce;

        let defaults = WorkflowDefaults::from(&cfg);
        assert_eq!(defaults.quantity.mode, InvoiceQuantityPolicy::Received);
        assert_eq!(defaults.quantity.invoice_tolerance_percent, dec!(5));
        assert_eq!(defaults.credit_policy, CreditPolicy::Enforce);
        assert_eq!(defaults.document_number_width, cfg.document_number_width);
    }

    #[test]
    fn rejects_out_of_range_tolerance() {
        let input = UpdateSettings {
            invoice_quantity_policy: InvoiceQuantityPolicy::Ordered,
            invoice_tolerance_percent: dec!(101),
            receipt_tolerance_percent: dec!(0),
            credit_policy: CreditPolicy::Advisory,
            expected_version: None,
        };
        assert!(input.validate().is_err());
    }
}
