use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::deliveries::cancel_delivery;
use super::parties::{active_party, PartyRole};
use super::settings::effective_settings;
use super::{
    check_version, due_after, ensure_products, price_lines, today, Audited, LineInput,
    ServiceDeps, TransitionPayload,
};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{
    CreditPolicy, DeliveryStatus, DocumentType, ObligationDirection, SalesOrderStatus,
};
use crate::entities::{delivery, party, sales_order, sales_order_line};
use crate::errors::ServiceError;
use crate::ledger;
use crate::numbering;
use crate::tenancy::{TenantContext, TenantGateway};
use crate::totals::{DocumentTotals, LineTotals};
use crate::workflow::{invalid_transition, StatusMachine, DELETED, EDITED};

const DOCUMENT: DocumentType = DocumentType::SalesOrder;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateSalesOrder {
    pub customer_id: Uuid,
    /// Defaults to today.
    #[serde(default)]
    pub order_date: Option<NaiveDate>,
    pub lines: Vec<LineInput>,
    #[serde(default)]
    pub shipping_amount: Decimal,
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateSalesOrder {
    pub fn new(customer_id: Uuid, lines: Vec<LineInput>) -> Self {
        Self {
            customer_id,
            order_date: None,
            lines,
            shipping_amount: Decimal::ZERO,
            notes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceSalesOrderLines {
    pub lines: Vec<LineInput>,
    /// Keeps the current shipping amount when absent.
    #[serde(default)]
    pub shipping_amount: Option<Decimal>,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesOrderDetail {
    pub order: sales_order::Model,
    pub lines: Vec<sales_order_line::Model>,
}

fn set_totals(model: &mut sales_order::ActiveModel, totals: &DocumentTotals) {
    model.subtotal = Set(totals.subtotal);
    model.discount_total = Set(totals.discount_total);
    model.tax_total = Set(totals.tax_total);
    model.shipping_amount = Set(totals.shipping_amount);
    model.grand_total = Set(totals.grand_total);
}

async fn insert_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    sales_order_id: Uuid,
    inputs: &[LineInput],
    priced: &[LineTotals],
) -> Result<Vec<sales_order_line::Model>, ServiceError> {
    let now = Utc::now();
    let mut lines = Vec::with_capacity(inputs.len());
    for (line_no, (input, totals)) in (1..).zip(inputs.iter().zip(priced)) {
        let line = gw
            .insert(sales_order_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                sales_order_id: Set(sales_order_id),
                line_no: Set(line_no),
                product_id: Set(input.product_id),
                unit: Set(input.unit.clone()),
                lot_number: Set(input.lot_number.clone()),
                quantity: Set(input.quantity),
                unit_price: Set(input.unit_price),
                discount_amount: Set(totals.discount_amount),
                tax_rate: Set(input.tax_rate),
                tax_amount: Set(totals.tax_amount),
                line_total: Set(totals.line_total),
                delivered_qty: Set(Decimal::ZERO),
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
    sales_order_id: Uuid,
) -> Result<Vec<sales_order_line::Model>, ServiceError> {
    gw.all(
        sales_order_line::Entity::find()
            .filter(sales_order_line::Column::SalesOrderId.eq(sales_order_id))
            .order_by_asc(sales_order_line::Column::LineNo),
    )
    .await
}

async fn load_detail<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    sales_order_id: Uuid,
) -> Result<SalesOrderDetail, ServiceError> {
    let order = gw.get::<sales_order::Entity>(sales_order_id).await?;
    let lines = order_lines(gw, sales_order_id).await?;
    Ok(SalesOrderDetail { order, lines })
}

/// Sales order lifecycle from draft to completion.
#[derive(Clone)]
pub struct SalesOrderService {
    deps: ServiceDeps,
}

impl SalesOrderService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), customer_id = %input.customer_id))]
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreateSalesOrder,
    ) -> Result<SalesOrderDetail, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "sales_order.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let detail = self.deps.committed(outcome);
        info!(
            sales_order_id = %detail.order.id,
            document_number = %detail.order.document_number,
            grand_total = %detail.order.grand_total,
            "sales order created"
        );
        Ok(detail)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreateSalesOrder,
    ) -> Result<Audited<SalesOrderDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let customer = active_party(&gw, input.customer_id, PartyRole::Customer).await?;
        let (priced, totals) = price_lines(&input.lines, input.shipping_amount)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.product_id)).await?;

        let document_number =
            numbering::allocate(&gw, DOCUMENT, self.deps.defaults.document_number_width).await?;
        let now = Utc::now();
        let mut header = sales_order::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_number: Set(document_number),
            customer_id: Set(customer.id),
            status: Set(SalesOrderStatus::INITIAL),
            order_date: Set(input.order_date.unwrap_or_else(today)),
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

        let detail = SalesOrderDetail { order, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), detail.order.id, AuditAction::Create)
            .with_after(&detail);
        Ok((detail, vec![record]))
    }

    pub async fn get(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<SalesOrderDetail, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        load_detail(&gw, sales_order_id).await
    }

    pub async fn list(
        &self,
        ctx: &TenantContext,
        status: Option<SalesOrderStatus>,
    ) -> Result<Vec<sales_order::Model>, ServiceError> {
        let mut select = sales_order::Entity::find().order_by_asc(sales_order::Column::DocumentNumber);
        if let Some(status) = status {
            select = select.filter(sales_order::Column::Status.eq(status));
        }
        TenantGateway::new(self.deps.db.as_ref(), ctx).all(select).await
    }

    /// Replaces every line and recomputes totals. Draft orders only.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn replace_lines(
        &self,
        ctx: &TenantContext,
        sales_order_id: Uuid,
        input: ReplaceSalesOrderLines,
    ) -> Result<SalesOrderDetail, ServiceError> {
        let input = &input;
        let outcome = with_retry(self.deps.retry, "sales_order.replace_lines", || async move {
            let txn = self.deps.begin().await?;
            let result = self.replace_lines_in_txn(&txn, ctx, sales_order_id, input).await;
            finish(txn, result).await
        })
        .await?;

        Ok(self.deps.committed(outcome))
    }

    async fn replace_lines_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        sales_order_id: Uuid,
        input: &ReplaceSalesOrderLines,
    ) -> Result<Audited<SalesOrderDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let before = load_detail(&gw, sales_order_id).await?;
        let order = &before.order;
        check_version(input.expected_version, "sales order", order.id, order.version)?;
        if order.status != SalesOrderStatus::Draft {
            return Err(invalid_transition(DOCUMENT, order.status.to_string(), EDITED));
        }

        let shipping = input.shipping_amount.unwrap_or(order.shipping_amount);
        let (priced, totals) = price_lines(&input.lines, shipping)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.product_id)).await?;

        gw.delete_where::<sales_order_line::Entity>(
            Condition::all().add(sales_order_line::Column::SalesOrderId.eq(order.id)),
        )
        .await?;
        let lines = insert_lines(&gw, order.id, &input.lines, &priced).await?;

        let mut update = sales_order::ActiveModel {
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        set_totals(&mut update, &totals);
        let order = gw
            .update::<sales_order::Entity, _>(order.id, update, Some(order.version))
            .await?;

        let after = SalesOrderDetail { order, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), after.order.id, AuditAction::Update)
            .with_before(&before)
            .with_after(&after);
        Ok((after, vec![record]))
    }

    /// Hard delete of a draft order and its lines.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn delete(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<(), ServiceError> {
        let outcome = with_retry(self.deps.retry, "sales_order.delete", || async move {
            let txn = self.deps.begin().await?;
            let result = self.delete_in_txn(&txn, ctx, sales_order_id).await;
            finish(txn, result).await
        })
        .await?;

        self.deps.committed(outcome);
        info!(%sales_order_id, "sales order deleted");
        Ok(())
    }

    async fn delete_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        sales_order_id: Uuid,
    ) -> Result<Audited<()>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let before = load_detail(&gw, sales_order_id).await?;
        if before.order.status != SalesOrderStatus::Draft {
            return Err(invalid_transition(
                DOCUMENT,
                before.order.status.to_string(),
                DELETED,
            ));
        }

        gw.delete_where::<sales_order_line::Entity>(
            Condition::all().add(sales_order_line::Column::SalesOrderId.eq(sales_order_id)),
        )
        .await?;
        gw.delete::<sales_order::Entity>(sales_order_id).await?;

        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), sales_order_id, AuditAction::Delete)
            .with_before(&before);
        Ok(((), vec![record]))
    }

    pub async fn submit(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Pending, TransitionPayload::default())
            .await
    }

    /// Runs the credit check and opens the receivable.
    pub async fn approve(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Approved, TransitionPayload::default())
            .await
    }

    pub async fn start_processing(
        &self,
        ctx: &TenantContext,
        sales_order_id: Uuid,
    ) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Processing, TransitionPayload::default())
            .await
    }

    pub async fn ship(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Shipped, TransitionPayload::default())
            .await
    }

    pub async fn deliver(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Delivered, TransitionPayload::default())
            .await
    }

    pub async fn complete(&self, ctx: &TenantContext, sales_order_id: Uuid) -> Result<sales_order::Model, ServiceError> {
        self.transition(ctx, sales_order_id, SalesOrderStatus::Completed, TransitionPayload::default())
            .await
    }

    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        sales_order_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<sales_order::Model, ServiceError> {
        self.transition(
            ctx,
            sales_order_id,
            SalesOrderStatus::Cancelled,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        sales_order_id: Uuid,
        target: SalesOrderStatus,
        payload: TransitionPayload,
    ) -> Result<sales_order::Model, ServiceError> {
        let payload = &payload;
        let outcome = with_retry(self.deps.retry, "sales_order.transition", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .transition_in_txn(&txn, ctx, sales_order_id, target, payload)
                .await;
            finish(txn, result).await
        })
        .await?;

        let order = self.deps.committed(outcome);
        info!(
            document_number = %order.document_number,
            status = %order.status,
            "sales order transitioned"
        );
        Ok(order)
    }

    async fn transition_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        sales_order_id: Uuid,
        target: SalesOrderStatus,
        payload: &TransitionPayload,
    ) -> Result<Audited<sales_order::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let order = gw.get::<sales_order::Entity>(sales_order_id).await?;
        payload.check_version("sales order", order.id, order.version)?;
        let next = order.status.transition(target)?;

        let now = Utc::now();
        let mut update = sales_order::ActiveModel {
            status: Set(next),
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(now),
            ..Default::default()
        };
        let mut records = Vec::new();

        match next {
            SalesOrderStatus::Approved => {
                self.open_receivable(&gw, &order).await?;
                update.approved_by = Set(Some(ctx.user_id()));
                update.approved_at = Set(Some(now));
            }
            SalesOrderStatus::Cancelled => {
                let reason = payload.required_reason()?;
                self.release_order(&gw, &order, &reason, &mut records).await?;
                update.cancelled_by = Set(Some(ctx.user_id()));
                update.cancelled_at = Set(Some(now));
                update.cancellation_reason = Set(Some(reason));
            }
            _ => {}
        }

        let updated = gw
            .update::<sales_order::Entity, _>(order.id, update, Some(order.version))
            .await?;
        records.push(AuditRecord::transition(
            ctx,
            DOCUMENT.to_string(),
            order.id,
            order.status,
            next,
        ));
        Ok((updated, records))
    }

    async fn open_receivable<C: ConnectionTrait>(
        &self,
        gw: &TenantGateway<'_, C>,
        order: &sales_order::Model,
    ) -> Result<(), ServiceError> {
        let settings = effective_settings(gw, &self.deps.defaults).await?;
        let customer = gw.get::<party::Entity>(order.customer_id).await?;
        let check = ledger::check_credit(&customer, order.grand_total);
        if check.exceeded {
            match settings.credit_policy {
                CreditPolicy::Enforce => {
                    return Err(ServiceError::CreditLimitExceeded(format!(
                        "{} needs {} but customer {} has {} available",
                        order.document_number, order.grand_total, customer.code, check.available_credit
                    )));
                }
                CreditPolicy::Advisory => warn!(
                    document_number = %order.document_number,
                    customer_id = %customer.id,
                    credit_limit = %check.credit_limit,
                    outstanding = %check.outstanding,
                    pending = %check.pending,
                    "credit limit exceeded, approving under advisory policy"
                ),
            }
        }

        let today = today();
        ledger::balance::open_obligation(
            gw,
            customer.id,
            ObligationDirection::Receivable,
            DOCUMENT,
            order.id,
            order.grand_total,
            due_after(today, customer.payment_term_days),
            today,
        )
        .await?;
        Ok(())
    }

    /// Cancels prepared deliveries and voids the receivable. Goods already on
    /// the way block the cancellation.
    async fn release_order<C: ConnectionTrait>(
        &self,
        gw: &TenantGateway<'_, C>,
        order: &sales_order::Model,
        reason: &str,
        records: &mut Vec<AuditRecord>,
    ) -> Result<(), ServiceError> {
        let deliveries = gw
            .all(delivery::Entity::find().filter(delivery::Column::SalesOrderId.eq(order.id)))
            .await?;

        if let Some(shipped) = deliveries.iter().find(|d| {
            matches!(
                d.status,
                DeliveryStatus::InTransit | DeliveryStatus::Delivered | DeliveryStatus::Confirmed
            )
        }) {
            return Err(ServiceError::InvariantViolation(format!(
                "{} cannot be cancelled while delivery {} is {}",
                order.document_number, shipped.document_number, shipped.status
            )));
        }

        for prepared in deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Prepared)
        {
            let (_, record) = cancel_delivery(gw, prepared, reason).await?;
            records.push(record);
        }

        ledger::balance::void_document_obligations(gw, DOCUMENT, order.id, today()).await?;
        Ok(())
    }
}
