use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::parties::{active_party, PartyRole};
use super::settings::effective_settings;
use super::{
    check_version, ensure_products, price_lines, today, Audited, LineInput, ServiceDeps,
    TransitionPayload,
};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{DocumentType, PurchaseOrderStatus, QuantityStatus};
use crate::entities::{purchase_order, purchase_order_line};
use crate::errors::ServiceError;
use crate::ledger::{self, QuantityStatusReport};
use crate::numbering;
use crate::tenancy::{TenantContext, TenantGateway};
use crate::totals::{DocumentTotals, LineTotals};
use crate::workflow::{invalid_transition, StatusMachine, DELETED, EDITED};

const DOCUMENT: DocumentType = DocumentType::PurchaseOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrder {
    pub supplier_id: Uuid,
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    #[serde(default)]
    pub expected_date: Option<NaiveDate>,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub shipping_amount: Decimal,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreatePurchaseOrder {
    pub fn new(supplier_id: Uuid, lines: Vec<LineInput>) -> Self {
        Self {
            supplier_id,
            order_date: None,
            expected_date: None,
            lines,
            shipping_amount: Decimal::ZERO,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacePurchaseOrderLines {
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub shipping_amount: Option<Decimal>,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseOrderDetail {
    pub order: purchase_order::Model,
    pub lines: Vec<purchase_order_line::Model>,
}

fn set_totals(model: &mut purchase_order::ActiveModel, totals: &DocumentTotals) {
    model.subtotal = Set(totals.subtotal);
    model.discount_total = Set(totals.discount_total);
    model.tax_total = Set(totals.tax_total);
    model.shipping_amount = Set(totals.shipping_amount);
    model.grand_total = Set(totals.grand_total);
}

async fn insert_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    inputs: &[LineInput],
    priced: &[LineTotals],
) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
    let now = Utc::now();
    let mut lines = Vec::with_capacity(inputs.len());
    for (line_no, (input, totals)) in (1..).zip(inputs.iter().zip(priced)) {
        let line = gw
            .insert(purchase_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_order_id: Set(purchase_order_id),
                line_no: Set(line_no),
                product_id: Set(input.product_id),
                unit: Set(input.unit.clone()),
                ordered_qty: Set(input.quantity),
                unit_price: Set(input.unit_price),
                discount_amount: Set(totals.discount_amount),
                tax_rate: Set(input.tax_rate),
                tax_amount: Set(totals.tax_amount),
                line_total: Set(totals.line_total),
                received_qty: Set(Decimal::ZERO),
                invoiced_qty: Set(Decimal::ZERO),
                version: Set(1),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            })
            .await?;
        lines.push(line);
    }
    Ok(lines)
}

pub(crate) async fn order_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
) -> Result<Vec<purchase_order_line::Model>, ServiceError> {
    gw.all(
        purchase_order_line::Entity::find()
            .filter(purchase_order_line::Column::PurchaseOrderId.eq(purchase_order_id))
            .order_by_asc(purchase_order_line::Column::LineNo),
    )
    .await
}

async fn load_detail<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
) -> Result<PurchaseOrderDetail, ServiceError> {
    let order = gw.get::<purchase_order::Entity>(purchase_order_id).await?;
    let lines = order_lines(gw, purchase_order_id).await?;
    Ok(PurchaseOrderDetail { order, lines })
}

#[derive(Clone)]
pub struct PurchaseOrderService {
    deps: ServiceDeps,
}

impl PurchaseOrderService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), supplier_id = %input.supplier_id))]
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreatePurchaseOrder,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "purchase_order.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let detail = self.deps.committed(outcome);
        info!(
            purchase_order_id = %detail.order.id,
            document_number = %detail.order.document_number,
            "purchase order created"
        );
        Ok(detail)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreatePurchaseOrder,
    ) -> Result<Audited<PurchaseOrderDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let supplier = active_party(&gw, input.supplier_id, PartyRole::Supplier).await?;
        let (priced, totals) = price_lines(&input.lines, input.shipping_amount)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.product_id)).await?;

        let document_number =
            numbering::allocate(&gw, DOCUMENT, self.deps.defaults.document_number_width).await?;
        let now = Utc::now();
        let mut header = purchase_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_number: Set(document_number),
            supplier_id: Set(supplier.id),
            status: Set(PurchaseOrderStatus::INITIAL),
            order_date: Set(input.order_date.unwrap_or_else(today)),
            expected_date: Set(input.expected_date),
            receipt_status: Set(QuantityStatus::None),
            invoice_status: Set(QuantityStatus::None),
            notes: Set(input.notes.clone()),
            created_by: Set(ctx.user_id()),
            created_at: Set(now),
            approved_by: Set(None),
            approved_at: Set(None),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            updated_by: Set(None),
            updated_at: Set(now),
            version: Set(1),
            ..Default::default()
        };
        set_totals(&mut header, &totals);
        let order = gw.insert(header).await?;
        let lines = insert_lines(&gw, order.id, &input.lines, &priced).await?;

        let detail = PurchaseOrderDetail { order, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), detail.order.id, AuditAction::Create)
            .with_after(&detail);
        Ok((detail, vec![record]))
    }

    pub async fn get(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        load_detail(&gw, purchase_order_id).await
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn replace_lines(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
        input: ReplacePurchaseOrderLines,
    ) -> Result<PurchaseOrderDetail, ServiceError> {
        let input = &input;
        let outcome = with_retry(self.deps.retry, "purchase_order.replace_lines", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .replace_lines_in_txn(&txn, ctx, purchase_order_id, input)
                .await;
            finish(txn, result).await
        })
        .await?;

        Ok(self.deps.committed(outcome))
    }

    async fn replace_lines_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
        input: &ReplacePurchaseOrderLines,
    ) -> Result<Audited<PurchaseOrderDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let before = load_detail(&gw, purchase_order_id).await?;
        let order = &before.order;
        check_version(input.expected_version, "purchase order", order.id, order.version)?;
        if order.status != PurchaseOrderStatus::Draft {
            return Err(invalid_transition(DOCUMENT, order.status.to_string(), EDITED));
        }

        let shipping = input.shipping_amount.unwrap_or(order.shipping_amount);
        let (priced, totals) = price_lines(&input.lines, shipping)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.product_id)).await?;

        gw.delete_where::<purchase_order_line::Entity>(
            Condition::all().add(purchase_order_line::Column::PurchaseOrderId.eq(order.id)),
        )
        .await?;
        let lines = insert_lines(&gw, order.id, &input.lines, &priced).await?;

        let mut update = purchase_order::ActiveModel {
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        set_totals(&mut update, &totals);
        let order = gw
            .update::<purchase_order::Entity, _>(order.id, update, Some(order.version))
            .await?;

        let after = PurchaseOrderDetail { order, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), after.order.id, AuditAction::Update)
            .with_before(&before)
            .with_after(&after);
        Ok((after, vec![record]))
    }

    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn delete(&self, ctx: &TenantContext, purchase_order_id: Uuid) -> Result<(), ServiceError> {
        let outcome = with_retry(self.deps.retry, "purchase_order.delete", || async move {
            let txn = self.deps.begin().await?;
            let result = async {
                let gw = TenantGateway::new(&txn, ctx);
                let before = load_detail(&gw, purchase_order_id).await?;
                if before.order.status != PurchaseOrderStatus::Draft {
                    return Err(invalid_transition(
                        DOCUMENT,
                        before.order.status.to_string(),
                        DELETED,
                    ));
                }
                gw.delete_where::<purchase_order_line::Entity>(
                    Condition::all()
                        .add(purchase_order_line::Column::PurchaseOrderId.eq(purchase_order_id)),
                )
                .await?;
                gw.delete::<purchase_order::Entity>(purchase_order_id).await?;
                let record =
                    AuditRecord::new(ctx, DOCUMENT.to_string(), purchase_order_id, AuditAction::Delete)
                        .with_before(&before);
                Ok::<_, ServiceError>(((), vec![record]))
            }
            .await;
            finish(txn, result).await
        })
        .await?;

        self.deps.committed(outcome);
        info!(%purchase_order_id, "purchase order deleted");
        Ok(())
    }

    pub async fn submit(&self, ctx: &TenantContext, purchase_order_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        self.transition(ctx, purchase_order_id, PurchaseOrderStatus::Submitted, TransitionPayload::default())
            .await
    }

    pub async fn approve(&self, ctx: &TenantContext, purchase_order_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        self.transition(ctx, purchase_order_id, PurchaseOrderStatus::Approved, TransitionPayload::default())
            .await
    }

    pub async fn close(&self, ctx: &TenantContext, purchase_order_id: Uuid) -> Result<purchase_order::Model, ServiceError> {
        self.transition(ctx, purchase_order_id, PurchaseOrderStatus::Closed, TransitionPayload::default())
            .await
    }

    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<purchase_order::Model, ServiceError> {
        self.transition(
            ctx,
            purchase_order_id,
            PurchaseOrderStatus::Cancelled,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
        target: PurchaseOrderStatus,
        payload: TransitionPayload,
    ) -> Result<purchase_order::Model, ServiceError> {
        let payload = &payload;
        let outcome = with_retry(self.deps.retry, "purchase_order.transition", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .transition_in_txn(&txn, ctx, purchase_order_id, target, payload)
                .await;
            finish(txn, result).await
        })
        .await?;

        let order = self.deps.committed(outcome);
        info!(
            document_number = %order.document_number,
            status = %order.status,
            "purchase order transitioned"
        );
        Ok(order)
    }

    async fn transition_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
        target: PurchaseOrderStatus,
        payload: &TransitionPayload,
    ) -> Result<Audited<purchase_order::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let order = gw.get::<purchase_order::Entity>(purchase_order_id).await?;
        payload.check_version("purchase order", order.id, order.version)?;
        let next = order.status.transition(target)?;

        let now = Utc::now();
        let mut update = purchase_order::ActiveModel {
            status: Set(next),
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(now),
            ..Default::default()
        };
        match next {
            PurchaseOrderStatus::Approved => {
                update.approved_by = Set(Some(ctx.user_id()));
                update.approved_at = Set(Some(now));
            }
            PurchaseOrderStatus::Cancelled => {
                let reason = payload.required_reason()?;
                let lines = order_lines(&gw, order.id).await?;
                if lines
                    .iter()
                    .any(|line| line.received_qty > Decimal::ZERO || line.invoiced_qty > Decimal::ZERO)
                {
                    return Err(ServiceError::InvariantViolation(format!(
                        "{} has received or invoiced quantity and cannot be cancelled",
                        order.document_number
                    )));
                }
                update.cancelled_by = Set(Some(ctx.user_id()));
                update.cancelled_at = Set(Some(now));
                update.cancellation_reason = Set(Some(reason));
            }
            _ => {}
        }

        let updated = gw
            .update::<purchase_order::Entity, _>(order.id, update, Some(order.version))
            .await?;
        let record = AuditRecord::transition(ctx, DOCUMENT.to_string(), order.id, order.status, next);
        Ok((updated, vec![record]))
    }

    /// Receipt and invoice progress under the caller's current policy.
    pub async fn quantity_status(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
    ) -> Result<QuantityStatusReport, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        let settings = effective_settings(&gw, &self.deps.defaults).await?;
        ledger::quantity::effective_status(&gw, purchase_order_id, &settings.quantity).await
    }
}
