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

use super::sales_orders::order_lines;
use super::{today, Audited, ServiceDeps, TransitionPayload};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{DeliveryStatus, DocumentType, SalesOrderStatus};
use crate::entities::{delivery, delivery_line, sales_order};
use crate::errors::ServiceError;
use crate::ledger::{self, QuantityDelta};
use crate::numbering;
use crate::tenancy::{TenantContext, TenantGateway};
use crate::workflow::StatusMachine;

const DOCUMENT: DocumentType = DocumentType::Delivery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryLineInput {
    pub sales_order_line_id: Uuid,
    pub quantity: Decimal,
    #[serde(default)]
    pub lot_number: Option<String>,
}

impl DeliveryLineInput {
    pub fn new(sales_order_line_id: Uuid, quantity: Decimal) -> Self {
        Self {
            sales_order_line_id,
            quantity,
            lot_number: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreateDelivery {
    pub sales_order_id: Uuid,
    #[serde(default)]
    pub delivery_date: Option<NaiveDate>,
    #[validate(length(max = 128))]
    #[serde(default)]
    pub carrier: Option<String>,
    #[validate(length(max = 128))]
    #[serde(default)]
    pub tracking_number: Option<String>,
    /// Empty means everything still undelivered on the order.
    #[serde(default)]
    pub lines: Vec<DeliveryLineInput>,
}

impl CreateDelivery {
    pub fn remaining_of(sales_order_id: Uuid) -> Self {
        Self {
            sales_order_id,
            delivery_date: None,
            carrier: None,
            tracking_number: None,
            lines: Vec::new(),
        }
    }

    pub fn with_lines(sales_order_id: Uuid, lines: Vec<DeliveryLineInput>) -> Self {
        Self {
            lines,
            ..Self::remaining_of(sales_order_id)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryDetail {
    pub delivery: delivery::Model,
    pub lines: Vec<delivery_line::Model>,
}

async fn delivery_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    delivery_id: Uuid,
) -> Result<Vec<delivery_line::Model>, ServiceError> {
    gw.all(
        delivery_line::Entity::find()
            .filter(delivery_line::Column::DeliveryId.eq(delivery_id))
            .order_by_asc(delivery_line::Column::CreatedAt),
    )
    .await
}

/// Cancels one delivery and gives its quantities back to the sales order.
pub(crate) async fn cancel_delivery<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    current: &delivery::Model,
    reason: &str,
) -> Result<(delivery::Model, AuditRecord), ServiceError> {
    let ctx = gw.context();
    let next = current.status.transition(DeliveryStatus::Cancelled)?;

    let deltas: Vec<QuantityDelta> = delivery_lines(gw, current.id)
        .await?
        .iter()
        .map(|line| QuantityDelta::new(line.sales_order_line_id, line.quantity))
        .collect();
    ledger::quantity::reverse_delivery(gw, current.sales_order_id, &deltas).await?;

    let now = Utc::now();
    let update = delivery::ActiveModel {
        status: Set(next),
        cancelled_by: Set(Some(ctx.user_id())),
        cancelled_at: Set(Some(now)),
        cancellation_reason: Set(Some(reason.to_string())),
        updated_by: Set(Some(ctx.user_id())),
        updated_at: Set(now),
        ..Default::default()
    };
    let updated = gw
        .update::<delivery::Entity, _>(current.id, update, Some(current.version))
        .await?;
    let record = AuditRecord::transition(ctx, DOCUMENT.to_string(), current.id, current.status, next);
    Ok((updated, record))
}

/// Shipments against approved sales orders.
#[derive(Clone)]
pub struct DeliveryService {
    deps: ServiceDeps,
}

impl DeliveryService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), sales_order_id = %input.sales_order_id))]
    pub async fn create(&self, ctx: &TenantContext, input: CreateDelivery) -> Result<DeliveryDetail, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "delivery.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let detail = self.deps.committed(outcome);
        info!(
            delivery_id = %detail.delivery.id,
            document_number = %detail.delivery.document_number,
            lines = detail.lines.len(),
            "delivery created"
        );
        Ok(detail)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreateDelivery,
    ) -> Result<Audited<DeliveryDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let order = gw.get::<sales_order::Entity>(input.sales_order_id).await?;
        if order.status != SalesOrderStatus::Approved {
            return Err(ServiceError::ValidationError(format!(
                "deliveries need an approved sales order, {} is {}",
                order.document_number, order.status
            )));
        }

        let order_lines = order_lines(&gw, order.id).await?;
        let requested: Vec<DeliveryLineInput> = if input.lines.is_empty() {
            order_lines
                .iter()
                .filter(|line| line.quantity > line.delivered_qty)
                .map(|line| DeliveryLineInput {
                    sales_order_line_id: line.id,
                    quantity: line.quantity - line.delivered_qty,
                    lot_number: line.lot_number.clone(),
                })
                .collect()
        } else {
            input.lines.clone()
        };
        if requested.is_empty() {
            return Err(ServiceError::ValidationError(format!(
                "{} has nothing left to deliver",
                order.document_number
            )));
        }

        let products: HashMap<Uuid, Uuid> = order_lines
            .iter()
            .map(|line| (line.id, line.product_id))
            .collect();
        let deltas: Vec<QuantityDelta> = requested
            .iter()
            .map(|line| QuantityDelta::new(line.sales_order_line_id, line.quantity))
            .collect();
        ledger::quantity::apply_delivery(&gw, order.id, &deltas).await?;

        // Serializes against a concurrent cancellation of the order.
        let touch = sales_order::ActiveModel {
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        gw.update::<sales_order::Entity, _>(order.id, touch, Some(order.version))
            .await?;

        let document_number =
            numbering::allocate(&gw, DOCUMENT, self.deps.defaults.document_number_width).await?;
        let now = Utc::now();
        let delivery = gw
            .insert(delivery::ActiveModel {
                id: Set(Uuid::new_v4()),
                document_number: Set(document_number),
                sales_order_id: Set(order.id),
                customer_id: Set(order.customer_id),
                status: Set(DeliveryStatus::INITIAL),
                delivery_date: Set(input.delivery_date.unwrap_or_else(today)),
                carrier: Set(input.carrier.clone()),
                tracking_number: Set(input.tracking_number.clone()),
                created_by: Set(ctx.user_id()),
                created_at: Set(now),
                shipped_at: Set(None),
                delivered_at: Set(None),
                confirmed_by: Set(None),
                confirmed_at: Set(None),
                cancelled_by: Set(None),
                cancelled_at: Set(None),
                cancellation_reason: Set(None),
                updated_by: Set(None),
                updated_at: Set(now),
                version: Set(1),
                ..Default::default()
            })
            .await?;

        let mut lines = Vec::with_capacity(requested.len());
        for line in &requested {
            // apply_delivery has already rejected foreign lines.
            let product_id = products.get(&line.sales_order_line_id).copied().ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "line {} does not belong to {}",
                    line.sales_order_line_id, order.document_number
                ))
            })?;
            let line = gw
                .insert(delivery_line::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    delivery_id: Set(delivery.id),
                    sales_order_line_id: Set(line.sales_order_line_id),
                    product_id: Set(product_id),
                    quantity: Set(line.quantity),
                    lot_number: Set(line.lot_number.clone()),
                    created_at: Set(now),
                    ..Default::default()
                })
                .await?;
            lines.push(line);
        }

        let detail = DeliveryDetail { delivery, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), detail.delivery.id, AuditAction::Create)
            .with_after(&detail);
        Ok((detail, vec![record]))
    }

    pub async fn get(&self, ctx: &TenantContext, delivery_id: Uuid) -> Result<DeliveryDetail, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        let delivery = gw.get::<delivery::Entity>(delivery_id).await?;
        let lines = delivery_lines(&gw, delivery_id).await?;
        Ok(DeliveryDetail { delivery, lines })
    }

    pub async fn list_for_order(
        &self,
        ctx: &TenantContext,
        sales_order_id: Uuid,
    ) -> Result<Vec<delivery::Model>, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .all(
                delivery::Entity::find()
                    .filter(delivery::Column::SalesOrderId.eq(sales_order_id))
                    .order_by_asc(delivery::Column::DocumentNumber),
            )
            .await
    }

    pub async fn dispatch(&self, ctx: &TenantContext, delivery_id: Uuid) -> Result<delivery::Model, ServiceError> {
        self.transition(ctx, delivery_id, DeliveryStatus::InTransit, TransitionPayload::default())
            .await
    }

    pub async fn mark_delivered(&self, ctx: &TenantContext, delivery_id: Uuid) -> Result<delivery::Model, ServiceError> {
        self.transition(ctx, delivery_id, DeliveryStatus::Delivered, TransitionPayload::default())
            .await
    }

    pub async fn confirm(&self, ctx: &TenantContext, delivery_id: Uuid) -> Result<delivery::Model, ServiceError> {
        self.transition(ctx, delivery_id, DeliveryStatus::Confirmed, TransitionPayload::default())
            .await
    }

    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        delivery_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<delivery::Model, ServiceError> {
        self.transition(
            ctx,
            delivery_id,
            DeliveryStatus::Cancelled,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        delivery_id: Uuid,
        target: DeliveryStatus,
        payload: TransitionPayload,
    ) -> Result<delivery::Model, ServiceError> {
        let payload = &payload;
        let outcome = with_retry(self.deps.retry, "delivery.transition", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .transition_in_txn(&txn, ctx, delivery_id, target, payload)
                .await;
            finish(txn, result).await
        })
        .await?;

        let delivery = self.deps.committed(outcome);
        info!(
            document_number = %delivery.document_number,
            status = %delivery.status,
            "delivery transitioned"
        );
        Ok(delivery)
    }

    async fn transition_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        delivery_id: Uuid,
        target: DeliveryStatus,
        payload: &TransitionPayload,
    ) -> Result<Audited<delivery::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let current = gw.get::<delivery::Entity>(delivery_id).await?;
        payload.check_version("delivery", current.id, current.version)?;

        if target == DeliveryStatus::Cancelled {
            current.status.transition(target)?;
            let reason = payload.required_reason()?;
            let (updated, record) = cancel_delivery(&gw, &current, &reason).await?;
            return Ok((updated, vec![record]));
        }

        let next = current.status.transition(target)?;
        let now = Utc::now();
        let mut update = delivery::ActiveModel {
            status: Set(next),
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(now),
            ..Default::default()
        };
        match next {
            DeliveryStatus::InTransit => update.shipped_at = Set(Some(now)),
            DeliveryStatus::Delivered => update.delivered_at = Set(Some(now)),
            DeliveryStatus::Confirmed => {
                update.confirmed_by = Set(Some(ctx.user_id()));
                update.confirmed_at = Set(Some(now));
            }
            _ => {}
        }

        let updated = gw
            .update::<delivery::Entity, _>(current.id, update, Some(current.version))
            .await?;
        let record = AuditRecord::transition(ctx, DOCUMENT.to_string(), current.id, current.status, next);
        Ok((updated, vec![record]))
    }
}
