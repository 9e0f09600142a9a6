use chrono::Utc;
use sea_orm::{ActiveValue::Set, DatabaseTransaction, EntityTrait, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::{Audited, ServiceDeps};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::product;
use crate::errors::ServiceError;
use crate::tenancy::{TenantContext, TenantGateway};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

/// Products referenced by document lines.
#[derive(Clone)]
pub struct CatalogService {
    deps: ServiceDeps,
}

impl CatalogService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), code = %input.code))]
    pub async fn create_product(
        &self,
        ctx: &TenantContext,
        input: CreateProduct,
    ) -> Result<product::Model, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "product.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let product = self.deps.committed(outcome);
        info!(product_id = %product.id, "product created");
        Ok(product)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreateProduct,
    ) -> Result<Audited<product::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let now = Utc::now();
        let product = gw
            .insert(product::ActiveModel {
                id: Set(Uuid::new_v4()),
                code: Set(input.code.trim().to_string()),
                name: Set(input.name.clone()),
                unit: Set(input.unit.clone()),
                is_active: Set(true),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;
        let record = AuditRecord::new(ctx, "PRODUCT", product.id, AuditAction::Create).with_after(&product);
        Ok((product, vec![record]))
    }

    pub async fn get_product(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .get::<product::Entity>(product_id)
            .await
    }

    pub async fn list_products(&self, ctx: &TenantContext) -> Result<Vec<product::Model>, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .all(product::Entity::find().order_by_asc(product::Column::Code))
            .await
    }

    /// Inactive products can no longer be put on new lines.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn deactivate_product(
        &self,
        ctx: &TenantContext,
        product_id: Uuid,
    ) -> Result<product::Model, ServiceError> {
        let outcome = with_retry(self.deps.retry, "product.deactivate", || async move {
            let txn = self.deps.begin().await?;
            let result = async {
                let gw = TenantGateway::new(&txn, ctx);
                let current = gw.get::<product::Entity>(product_id).await?;
                let update = product::ActiveModel {
                    is_active: Set(false),
                    updated_at: Set(Utc::now()),
                    ..Default::default()
                };
                let updated = gw
                    .update::<product::Entity, _>(product_id, update, Some(current.version))
                    .await?;
                let record = AuditRecord::new(ctx, "PRODUCT", product_id, AuditAction::Update)
                    .with_before(&current)
                    .with_after(&updated);
                Ok::<_, ServiceError>((updated, vec![record]))
            }
            .await;
            finish(txn, result).await
        })
        .await?;

        Ok(self.deps.committed(outcome))
    }
}
