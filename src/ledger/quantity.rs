//! Cross-document quantity bookkeeping.
//!
//! Purchase order lines track how much was received and invoiced against
//! them; sales order lines track how much was delivered. Every change comes
//! in an apply/reverse pair so that a cancelled or deleted document gives
//! back exactly what it took. Each line write is a version compare-and-swap
//! on the freshly read row.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::entities::enums::{InvoiceQuantityPolicy, QuantityStatus};
use crate::entities::{purchase_order, purchase_order_line, sales_order_line};
use crate::errors::ServiceError;
use crate::tenancy::TenantGateway;
use crate::totals::ensure_storable;

/// Effective quantity rules for one tenant and company.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantityPolicy {
    pub mode: InvoiceQuantityPolicy,
    pub invoice_tolerance_percent: Decimal,
    pub receipt_tolerance_percent: Decimal,
}

impl Default for QuantityPolicy {
    fn default() -> Self {
        Self {
            mode: InvoiceQuantityPolicy::Ordered,
            invoice_tolerance_percent: Decimal::ZERO,
            receipt_tolerance_percent: Decimal::ZERO,
        }
    }
}

/// A positive quantity change against one source line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuantityDelta {
    pub line_id: Uuid,
    pub quantity: Decimal,
}

impl QuantityDelta {
    pub fn new(line_id: Uuid, quantity: Decimal) -> Self {
        Self { line_id, quantity }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineQuantityStatus {
    pub line_id: Uuid,
    pub product_id: Uuid,
    pub ordered: Decimal,
    pub received: Decimal,
    pub invoiced: Decimal,
    pub max_invoiceable: Decimal,
    pub max_receivable: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuantityStatusReport {
    pub purchase_order_id: Uuid,
    pub receipt_status: QuantityStatus,
    pub invoice_status: QuantityStatus,
    pub lines: Vec<LineQuantityStatus>,
}

pub fn tolerance_factor(percent: Decimal) -> Decimal {
    Decimal::ONE + percent / Decimal::ONE_HUNDRED
}

/// `base × (1 + percent/100)`, saturating instead of overflowing.
fn with_tolerance(base: Decimal, percent: Decimal) -> Decimal {
    base.checked_mul(tolerance_factor(percent))
        .unwrap_or(Decimal::MAX)
}

/// `base × (1 + tolerance) − invoiced`, never below zero. The base is the
/// ordered or the received quantity depending on the policy.
pub fn max_invoiceable(line: &purchase_order_line::Model, policy: &QuantityPolicy) -> Decimal {
    let base = match policy.mode {
        InvoiceQuantityPolicy::Ordered => line.ordered_qty,
        InvoiceQuantityPolicy::Received => line.received_qty,
    };
    with_tolerance(base, policy.invoice_tolerance_percent)
        .saturating_sub(line.invoiced_qty)
        .max(Decimal::ZERO)
}

pub fn max_receivable(line: &purchase_order_line::Model, policy: &QuantityPolicy) -> Decimal {
    with_tolerance(line.ordered_qty, policy.receipt_tolerance_percent)
        .saturating_sub(line.received_qty)
        .max(Decimal::ZERO)
}

/// `NONE` when nothing is done, `FULL` when every line reached its target.
pub fn aggregate_status(progress: impl IntoIterator<Item = (Decimal, Decimal)>) -> QuantityStatus {
    let mut any_done = false;
    let mut all_full = true;
    let mut seen = false;
    for (done, target) in progress {
        seen = true;
        if done > Decimal::ZERO {
            any_done = true;
        }
        if done < target {
            all_full = false;
        }
    }

    match (seen, any_done, all_full) {
        (false, _, _) | (true, false, _) => QuantityStatus::None,
        (true, true, true) => QuantityStatus::Full,
        (true, true, false) => QuantityStatus::Partial,
    }
}

/// Merges deltas per line and rejects non-positive quantities.
pub fn merge_deltas(
    deltas: impl IntoIterator<Item = QuantityDelta>,
) -> Result<Vec<QuantityDelta>, ServiceError> {
    let mut merged: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for delta in deltas {
        if delta.quantity <= Decimal::ZERO {
            return Err(ServiceError::invalid_field(
                "quantity",
                "must be greater than zero",
            ));
        }
        ensure_storable("quantity", delta.quantity)?;
        let total = merged.entry(delta.line_id).or_insert(Decimal::ZERO);
        *total += delta.quantity;
        ensure_storable("quantity", *total)?;
    }
    Ok(merged
        .into_iter()
        .map(|(line_id, quantity)| QuantityDelta { line_id, quantity })
        .collect())
}

async fn purchase_order_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
) -> Result<HashMap<Uuid, purchase_order_line::Model>, ServiceError> {
    let lines = gw
        .all(
            purchase_order_line::Entity::find()
                .filter(purchase_order_line::Column::PurchaseOrderId.eq(purchase_order_id)),
        )
        .await?;
    Ok(lines.into_iter().map(|line| (line.id, line)).collect())
}

fn foreign_line(line_id: Uuid, document: &str, document_id: Uuid) -> ServiceError {
    ServiceError::ValidationError(format!(
        "line {} does not belong to {} {}",
        line_id, document, document_id
    ))
}

async fn write_po_line<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    line: &purchase_order_line::Model,
    received_qty: Decimal,
    invoiced_qty: Decimal,
) -> Result<(), ServiceError> {
    let update = purchase_order_line::ActiveModel {
        received_qty: Set(received_qty),
        invoiced_qty: Set(invoiced_qty),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    gw.update::<purchase_order_line::Entity, _>(line.id, update, Some(line.version))
        .await?;
    Ok(())
}

/// Books invoiced quantity. Every line is checked before any is written.
pub async fn apply_invoice<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    deltas: &[QuantityDelta],
    policy: &QuantityPolicy,
) -> Result<(), ServiceError> {
    let lines = purchase_order_lines(gw, purchase_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "purchase order", purchase_order_id))?;
        let available = max_invoiceable(line, policy);
        if delta.quantity > available {
            return Err(ServiceError::InvariantViolation(format!(
                "line {} cannot be invoiced for {}: at most {} is invoiceable",
                line.id, delta.quantity, available
            )));
        }
    }

    for delta in &deltas {
        if let Some(line) = lines.get(&delta.line_id) {
            write_po_line(gw, line, line.received_qty, line.invoiced_qty + delta.quantity).await?;
        }
    }

    recompute_purchase_order_status(gw, purchase_order_id).await?;
    debug!(%purchase_order_id, lines = deltas.len(), "invoiced quantity applied");
    Ok(())
}

/// Gives back invoiced quantity. Floors at zero.
pub async fn reverse_invoice<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    deltas: &[QuantityDelta],
) -> Result<(), ServiceError> {
    let lines = purchase_order_lines(gw, purchase_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "purchase order", purchase_order_id))?;
        let invoiced = floor_at_zero(line.invoiced_qty, delta.quantity, line.id, "invoiced_qty");
        write_po_line(gw, line, line.received_qty, invoiced).await?;
    }

    recompute_purchase_order_status(gw, purchase_order_id).await?;
    debug!(%purchase_order_id, lines = deltas.len(), "invoiced quantity reversed");
    Ok(())
}

/// Books received quantity, bounded by ordered × (1 + receipt tolerance).
pub async fn apply_receipt<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    deltas: &[QuantityDelta],
    policy: &QuantityPolicy,
) -> Result<(), ServiceError> {
    let lines = purchase_order_lines(gw, purchase_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "purchase order", purchase_order_id))?;
        let available = max_receivable(line, policy);
        if delta.quantity > available {
            return Err(ServiceError::InvariantViolation(format!(
                "line {} cannot receive {}: at most {} is receivable",
                line.id, delta.quantity, available
            )));
        }
    }

    for delta in &deltas {
        if let Some(line) = lines.get(&delta.line_id) {
            write_po_line(gw, line, line.received_qty + delta.quantity, line.invoiced_qty).await?;
        }
    }

    recompute_purchase_order_status(gw, purchase_order_id).await?;
    debug!(%purchase_order_id, lines = deltas.len(), "received quantity applied");
    Ok(())
}

/// Gives back received quantity.
///
/// Under the `RECEIVED` policy this is refused when the quantity already
/// invoiced would no longer be covered by what remains received.
pub async fn reverse_receipt<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    deltas: &[QuantityDelta],
    policy: &QuantityPolicy,
) -> Result<(), ServiceError> {
    let lines = purchase_order_lines(gw, purchase_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    let mut writes = Vec::with_capacity(deltas.len());
    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "purchase order", purchase_order_id))?;
        let received = floor_at_zero(line.received_qty, delta.quantity, line.id, "received_qty");
        if policy.mode == InvoiceQuantityPolicy::Received {
            let bound = with_tolerance(received, policy.invoice_tolerance_percent);
            if line.invoiced_qty > bound {
                return Err(ServiceError::InvariantViolation(format!(
                    "line {} has {} invoiced; reversing the receipt would leave only {} received",
                    line.id, line.invoiced_qty, received
                )));
            }
        }
        writes.push((line, received));
    }

    for (line, received) in writes {
        write_po_line(gw, line, received, line.invoiced_qty).await?;
    }

    recompute_purchase_order_status(gw, purchase_order_id).await?;
    debug!(%purchase_order_id, lines = deltas.len(), "received quantity reversed");
    Ok(())
}

async fn sales_order_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    sales_order_id: Uuid,
) -> Result<HashMap<Uuid, sales_order_line::Model>, ServiceError> {
    let lines = gw
        .all(
            sales_order_line::Entity::find()
                .filter(sales_order_line::Column::SalesOrderId.eq(sales_order_id)),
        )
        .await?;
    Ok(lines.into_iter().map(|line| (line.id, line)).collect())
}

async fn write_so_line<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    line: &sales_order_line::Model,
    delivered_qty: Decimal,
) -> Result<(), ServiceError> {
    let update = sales_order_line::ActiveModel {
        delivered_qty: Set(delivered_qty),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    gw.update::<sales_order_line::Entity, _>(line.id, update, Some(line.version))
        .await?;
    Ok(())
}

/// Books delivered quantity, bounded by the ordered quantity.
pub async fn apply_delivery<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    sales_order_id: Uuid,
    deltas: &[QuantityDelta],
) -> Result<(), ServiceError> {
    let lines = sales_order_lines(gw, sales_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "sales order", sales_order_id))?;
        let remaining = (line.quantity - line.delivered_qty).max(Decimal::ZERO);
        if delta.quantity > remaining {
            return Err(ServiceError::InvariantViolation(format!(
                "line {} cannot deliver {}: only {} remains undelivered",
                line.id, delta.quantity, remaining
            )));
        }
    }

    for delta in &deltas {
        if let Some(line) = lines.get(&delta.line_id) {
            write_so_line(gw, line, line.delivered_qty + delta.quantity).await?;
        }
    }

    debug!(%sales_order_id, lines = deltas.len(), "delivered quantity applied");
    Ok(())
}

pub async fn reverse_delivery<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    sales_order_id: Uuid,
    deltas: &[QuantityDelta],
) -> Result<(), ServiceError> {
    let lines = sales_order_lines(gw, sales_order_id).await?;
    let deltas = merge_deltas(deltas.iter().copied())?;

    for delta in &deltas {
        let line = lines
            .get(&delta.line_id)
            .ok_or_else(|| foreign_line(delta.line_id, "sales order", sales_order_id))?;
        let delivered = floor_at_zero(line.delivered_qty, delta.quantity, line.id, "delivered_qty");
        write_so_line(gw, line, delivered).await?;
    }

    debug!(%sales_order_id, lines = deltas.len(), "delivered quantity reversed");
    Ok(())
}

fn floor_at_zero(current: Decimal, delta: Decimal, line_id: Uuid, field: &'static str) -> Decimal {
    let next = current - delta;
    if next.is_sign_negative() && !next.is_zero() {
        warn!(%line_id, field, %current, %delta, "reversal floored at zero");
        Decimal::ZERO
    } else {
        next
    }
}

/// Recomputes the purchase order's receipt and invoice aggregates.
///
/// The header is always rewritten under its version so that two writers
/// touching different lines of one order still serialize.
pub async fn recompute_purchase_order_status<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
) -> Result<purchase_order::Model, ServiceError> {
    let order = gw.get::<purchase_order::Entity>(purchase_order_id).await?;
    let lines = purchase_order_lines(gw, purchase_order_id).await?;

    let receipt_status = aggregate_status(
        lines
            .values()
            .map(|line| (line.received_qty, line.ordered_qty)),
    );
    let invoice_status = aggregate_status(
        lines
            .values()
            .map(|line| (line.invoiced_qty, line.ordered_qty)),
    );

    let update = purchase_order::ActiveModel {
        receipt_status: Set(receipt_status),
        invoice_status: Set(invoice_status),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    gw.update::<purchase_order::Entity, _>(order.id, update, Some(order.version))
        .await
}

/// Current aggregates plus per-line detail for one purchase order.
pub async fn effective_status<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_order_id: Uuid,
    policy: &QuantityPolicy,
) -> Result<QuantityStatusReport, ServiceError> {
    let order = gw.get::<purchase_order::Entity>(purchase_order_id).await?;
    let lines = gw
        .all(
            purchase_order_line::Entity::find()
                .filter(purchase_order_line::Column::PurchaseOrderId.eq(purchase_order_id))
                .order_by_asc(purchase_order_line::Column::LineNo),
        )
        .await?;

    Ok(QuantityStatusReport {
        purchase_order_id: order.id,
        receipt_status: order.receipt_status,
        invoice_status: order.invoice_status,
        lines: lines
            .iter()
            .map(|line| LineQuantityStatus {
                line_id: line.id,
                product_id: line.product_id,
                ordered: line.ordered_qty,
                received: line.received_qty,
                invoiced: line.invoiced_qty,
                max_invoiceable: max_invoiceable(line, policy),
                max_receivable: max_receivable(line, policy),
            })
            .collect(),
    })
}
