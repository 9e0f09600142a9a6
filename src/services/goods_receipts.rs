use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::purchase_orders::order_lines;
use super::settings::effective_settings;
use super::{today, Audited, ServiceDeps, TransitionPayload};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{DocumentType, GoodsReceiptStatus, PurchaseOrderStatus};
use crate::entities::{goods_receipt, goods_receipt_line, purchase_order};
use crate::errors::ServiceError;
use crate::ledger::{self, QuantityDelta};
use crate::numbering;
use crate::tenancy::{TenantContext, TenantGateway};
use crate::workflow::StatusMachine;

const DOCUMENT: DocumentType = DocumentType::GoodsReceipt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptLineInput {
    pub purchase_order_line_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub lot_number: Option<String>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
}

impl ReceiptLineInput {
    pub fn new(purchase_order_line_id: Uuid, quantity: Decimal) -> Self {
        Self {
            purchase_order_line_id,
            quantity,
            lot_number: None,
            expiry_date: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateGoodsReceipt {
    pub purchase_order_id: Uuid,
    #[serde(default)]
    pub receipt_date: Option<NaiveDate>,
    pub lines: Vec<ReceiptLineInput>,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateGoodsReceipt {
    pub fn new(purchase_order_id: Uuid, lines: Vec<ReceiptLineInput>) -> Self {
        Self {
            purchase_order_id,
            receipt_date: None,
            lines,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GoodsReceiptDetail {
    pub receipt: goods_receipt::Model,
    pub lines: Vec<goods_receipt_line::Model>,
}

async fn receipt_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    goods_receipt_id: Uuid,
) -> Result<Vec<goods_receipt_line::Model>, ServiceError> {
    gw.all(
        goods_receipt_line::Entity::find()
            .filter(goods_receipt_line::Column::GoodsReceiptId.eq(goods_receipt_id))
            .order_by_asc(goods_receipt_line::Column::CreatedAt),
    )
    .await
}

/// Incoming goods booked against approved purchase orders.
#[derive(Clone)]
pub struct GoodsReceiptService {
    deps: ServiceDeps,
}

impl GoodsReceiptService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), purchase_order_id = %input.purchase_order_id))]
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreateGoodsReceipt,
    ) -> Result<GoodsReceiptDetail, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "goods_receipt.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let detail = self.deps.committed(outcome);
        info!(
            goods_receipt_id = %detail.receipt.id,
            document_number = %detail.receipt.document_number,
            "goods receipt created"
        );
        Ok(detail)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreateGoodsReceipt,
    ) -> Result<Audited<GoodsReceiptDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let order = gw.get::<purchase_order::Entity>(input.purchase_order_id).await?;
        if order.status != PurchaseOrderStatus::Approved {
            return Err(ServiceError::ValidationError(format!(
                "goods can only be received against an approved purchase order, {} is {}",
                order.document_number, order.status
            )));
        }
        if input.lines.is_empty() {
            return Err(ServiceError::invalid_field(
                "lines",
                "at least one line is required",
            ));
        }

        let products: HashMap<Uuid, Uuid> = order_lines(&gw, order.id)
            .await?
            .into_iter()
            .map(|line| (line.id, line.product_id))
            .collect();
        let deltas: Vec<QuantityDelta> = input
            .lines
            .iter()
            .map(|line| QuantityDelta::new(line.purchase_order_line_id, line.quantity))
            .collect();
        let settings = effective_settings(&gw, &self.deps.defaults).await?;
        ledger::quantity::apply_receipt(&gw, order.id, &deltas, &settings.quantity).await?;

        let document_number =
            numbering::allocate(&gw, DOCUMENT, self.deps.defaults.document_number_width).await?;
        let now = Utc::now();
        let receipt = gw
            .insert(goods_receipt::ActiveModel {
                id: Set(Uuid::new_v4()),
                document_number: Set(document_number),
                purchase_order_id: Set(order.id),
                supplier_id: Set(order.supplier_id),
                status: Set(GoodsReceiptStatus::INITIAL),
                receipt_date: Set(input.receipt_date.unwrap_or_else(today)),
                notes: Set(input.notes.clone()),
                created_by: Set(ctx.user_id()),
                created_at: Set(now),
                cancelled_by: Set(None),
                cancelled_at: Set(None),
                cancellation_reason: Set(None),
                updated_by: Set(None),
                updated_at: Set(now),
                version: Set(1),
                ..Default::default()
            })
            .await?;

        let mut lines = Vec::with_capacity(input.lines.len());
        for line in &input.lines {
            let product_id = products
                .get(&line.purchase_order_line_id)
                .copied()
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "line {} does not belong to {}",
                        line.purchase_order_line_id, order.document_number
                    ))
                })?;
            let line = gw
                .insert(goods_receipt_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    goods_receipt_id: Set(receipt.id),
                    purchase_order_line_id: Set(line.purchase_order_line_id),
                    product_id: Set(product_id),
                    quantity: Set(line.quantity),
                    lot_number: Set(line.lot_number.clone()),
                    expiry_date: Set(line.expiry_date),
                    created_at: Set(now),
                    ..Default::default()
                })
                .await?;
            lines.push(line);
        }

        let detail = GoodsReceiptDetail { receipt, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), detail.receipt.id, AuditAction::Create)
            .with_after(&detail);
        Ok((detail, vec![record]))
    }

    pub async fn get(&self, ctx: &TenantContext, goods_receipt_id: Uuid) -> Result<GoodsReceiptDetail, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        let receipt = gw.get::<goods_receipt::Entity>(goods_receipt_id).await?;
        let lines = receipt_lines(&gw, goods_receipt_id).await?;
        Ok(GoodsReceiptDetail { receipt, lines })
    }

    /// Gives the received quantity back to the purchase order.
    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        goods_receipt_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<goods_receipt::Model, ServiceError> {
        self.transition(
            ctx,
            goods_receipt_id,
            GoodsReceiptStatus::Cancelled,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        goods_receipt_id: Uuid,
        target: GoodsReceiptStatus,
        payload: TransitionPayload,
    ) -> Result<goods_receipt::Model, ServiceError> {
        let payload = &payload;
        let outcome = with_retry(self.deps.retry, "goods_receipt.transition", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .transition_in_txn(&txn, ctx, goods_receipt_id, target, payload)
                .await;
            finish(txn, result).await
        })
        .await?;

        let receipt = self.deps.committed(outcome);
        info!(
            document_number = %receipt.document_number,
            status = %receipt.status,
            "goods receipt transitioned"
        );
        Ok(receipt)
    }

    async fn transition_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        goods_receipt_id: Uuid,
        target: GoodsReceiptStatus,
        payload: &TransitionPayload,
    ) -> Result<Audited<goods_receipt::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let receipt = gw.get::<goods_receipt::Entity>(goods_receipt_id).await?;
        payload.check_version("goods receipt", receipt.id, receipt.version)?;
        let next = receipt.status.transition(target)?;

        let now = Utc::now();
        let mut update = goods_receipt::ActiveModel {
            status: Set(next),
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(now),
            ..Default::default()
        };
        if next == GoodsReceiptStatus::Cancelled {
            let reason = payload.required_reason()?;
            let deltas: Vec<QuantityDelta> = receipt_lines(&gw, receipt.id)
                .await?
                .iter()
                .map(|line| QuantityDelta::new(line.purchase_order_line_id, line.quantity))
                .collect();
            let settings = effective_settings(&gw, &self.deps.defaults).await?;
            ledger::quantity::reverse_receipt(&gw, receipt.purchase_order_id, &deltas, &settings.quantity)
                .await?;
            update.cancelled_by = Set(Some(ctx.user_id()));
            update.cancelled_at = Set(Some(now));
            update.cancellation_reason = Set(Some(reason));
        }

        let updated = gw
            .update::<goods_receipt::Entity, _>(receipt.id, update, Some(receipt.version))
            .await?;
        let record = AuditRecord::transition(ctx, DOCUMENT.to_string(), receipt.id, receipt.status, next);
        Ok((updated, vec![record]))
    }
}
