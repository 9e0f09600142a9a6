use std::collections::HashMap;

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
use super::payments::book_payment;
use super::purchase_orders::order_lines;
use super::settings::effective_settings;
use super::{
    check_version, due_after, ensure_products, price_lines, today, Audited, LineInput,
    ServiceDeps, TransitionPayload,
};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{
    DocumentType, GoodsReceiptStatus, ObligationDirection, ObligationStatus,
    PurchaseInvoiceStatus, PurchaseOrderStatus,
};
use crate::entities::{
    goods_receipt, party, party_obligation, purchase_invoice, purchase_invoice_line, purchase_order,
};
use crate::errors::ServiceError;
use crate::ledger::{self, QuantityDelta, SettlementScope};
use crate::numbering;
use crate::tenancy::{TenantContext, TenantGateway};
use crate::totals::{DocumentTotals, LineTotals};
use crate::workflow::{invalid_transition, StatusMachine, DELETED, EDITED};

const DOCUMENT: DocumentType = DocumentType::PurchaseInvoice;

/// An invoice line, optionally matched to a purchase order line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineInput {
    #[serde(default)]
    pub purchase_order_line_id: Option<Uuid>,
    #[serde(flatten)]
    pub line: LineInput,
}

impl InvoiceLineInput {
    pub fn matched(purchase_order_line_id: Uuid, line: LineInput) -> Self {
        Self {
            purchase_order_line_id: Some(purchase_order_line_id),
            line,
        }
    }

    pub fn unmatched(line: LineInput) -> Self {
        Self {
            purchase_order_line_id: None,
            line,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseInvoice {
    pub supplier_id: Uuid,
    #[serde(default)]
    pub purchase_order_id: Option<Uuid>,
    #[serde(default)]
    pub goods_receipt_id: Option<Uuid>,
    #[validate(length(max = 64))]
    #[serde(default)]
    pub supplier_invoice_number: Option<String>,
    #[serde(default)]
    pub invoice_date: Option<NaiveDate>,
    /// Defaults to the invoice date plus the supplier's payment terms.
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub shipping_amount: Decimal,
    pub lines: Vec<InvoiceLineInput>,
}

impl CreatePurchaseInvoice {
    pub fn new(supplier_id: Uuid, lines: Vec<InvoiceLineInput>) -> Self {
        Self {
            supplier_id,
            purchase_order_id: None,
            goods_receipt_id: None,
            supplier_invoice_number: None,
            invoice_date: None,
            due_date: None,
            shipping_amount: Decimal::ZERO,
            lines,
        }
    }

    pub fn against_order(mut self, purchase_order_id: Uuid) -> Self {
        self.purchase_order_id = Some(purchase_order_id);
        self
    }

    pub fn against_receipt(mut self, goods_receipt_id: Uuid) -> Self {
        self.goods_receipt_id = Some(goods_receipt_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceInvoiceLines {
    pub lines: Vec<InvoiceLineInput>,
    #[serde(default)]
    pub shipping_amount: Option<Decimal>,
    #[serde(default)]
    pub expected_version: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseInvoiceDetail {
    pub invoice: purchase_invoice::Model,
    pub lines: Vec<purchase_invoice_line::Model>,
}

fn set_totals(model: &mut purchase_invoice::ActiveModel, totals: &DocumentTotals) {
    model.subtotal = Set(totals.subtotal);
    model.discount_total = Set(totals.discount_total);
    model.tax_total = Set(totals.tax_total);
    model.shipping_amount = Set(totals.shipping_amount);
    model.grand_total = Set(totals.grand_total);
}

fn invoice_deltas(lines: &[purchase_invoice_line::Model]) -> Vec<QuantityDelta> {
    lines
        .iter()
        .filter_map(|line| {
            line.purchase_order_line_id
                .map(|po_line| QuantityDelta::new(po_line, line.quantity))
        })
        .collect()
}

async fn invoice_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_invoice_id: Uuid,
) -> Result<Vec<purchase_invoice_line::Model>, ServiceError> {
    gw.all(
        purchase_invoice_line::Entity::find()
            .filter(purchase_invoice_line::Column::PurchaseInvoiceId.eq(purchase_invoice_id))
            .order_by_asc(purchase_invoice_line::Column::LineNo),
    )
    .await
}

async fn load_detail<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_invoice_id: Uuid,
) -> Result<PurchaseInvoiceDetail, ServiceError> {
    let invoice = gw.get::<purchase_invoice::Entity>(purchase_invoice_id).await?;
    let lines = invoice_lines(gw, purchase_invoice_id).await?;
    Ok(PurchaseInvoiceDetail { invoice, lines })
}

/// Resolves and checks the purchase order an invoice is matched to, either
/// given directly or through a goods receipt.
async fn resolve_order<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    supplier_id: Uuid,
    purchase_order_id: Option<Uuid>,
    goods_receipt_id: Option<Uuid>,
) -> Result<Option<purchase_order::Model>, ServiceError> {
    let mut order_id = purchase_order_id;

    if let Some(receipt_id) = goods_receipt_id {
        let receipt = gw.get::<goods_receipt::Entity>(receipt_id).await?;
        if receipt.status != GoodsReceiptStatus::Received {
            return Err(ServiceError::ValidationError(format!(
                "goods receipt {} is {}",
                receipt.document_number, receipt.status
            )));
        }
        match order_id {
            Some(id) if id != receipt.purchase_order_id => {
                return Err(ServiceError::ValidationError(format!(
                    "goods receipt {} belongs to another purchase order",
                    receipt.document_number
                )));
            }
            _ => order_id = Some(receipt.purchase_order_id),
        }
    }

    let Some(order_id) = order_id else {
        return Ok(None);
    };
    let order = gw.get::<purchase_order::Entity>(order_id).await?;
    if order.supplier_id != supplier_id {
        return Err(ServiceError::ValidationError(format!(
            "purchase order {} belongs to another supplier",
            order.document_number
        )));
    }
    if order.status != PurchaseOrderStatus::Approved {
        return Err(ServiceError::ValidationError(format!(
            "invoices need an approved purchase order, {} is {}",
            order.document_number, order.status
        )));
    }
    Ok(Some(order))
}

/// Checks matched lines against the order and books their quantities.
async fn apply_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    order: Option<&purchase_order::Model>,
    lines: &[InvoiceLineInput],
    defaults: &super::WorkflowDefaults,
) -> Result<(), ServiceError> {
    let Some(order) = order else {
        if lines.iter().any(|line| line.purchase_order_line_id.is_some()) {
            return Err(ServiceError::ValidationError(
                "purchase order lines need a purchase order".to_string(),
            ));
        }
        return Ok(());
    };

    let products: HashMap<Uuid, Uuid> = order_lines(gw, order.id)
        .await?
        .into_iter()
        .map(|line| (line.id, line.product_id))
        .collect();
    let mut deltas = Vec::new();
    for input in lines {
        let Some(po_line) = input.purchase_order_line_id else {
            continue;
        };
        match products.get(&po_line) {
            None => {
                return Err(ServiceError::ValidationError(format!(
                    "line {} does not belong to {}",
                    po_line, order.document_number
                )));
            }
            Some(product_id) if *product_id != input.line.product_id => {
                return Err(ServiceError::ValidationError(format!(
                    "line {} of {} is for another product",
                    po_line, order.document_number
                )));
            }
            Some(_) => deltas.push(QuantityDelta::new(po_line, input.line.quantity)),
        }
    }

    if !deltas.is_empty() {
        let settings = effective_settings(gw, defaults).await?;
        ledger::quantity::apply_invoice(gw, order.id, &deltas, &settings.quantity).await?;
    }
    Ok(())
}

/// Gives back every quantity the invoice lines took from the order.
async fn release_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    invoice: &purchase_invoice::Model,
    lines: &[purchase_invoice_line::Model],
) -> Result<(), ServiceError> {
    let deltas = invoice_deltas(lines);
    match invoice.purchase_order_id {
        Some(order_id) if !deltas.is_empty() => {
            ledger::quantity::reverse_invoice(gw, order_id, &deltas).await
        }
        _ => Ok(()),
    }
}

async fn insert_lines<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_invoice_id: Uuid,
    inputs: &[InvoiceLineInput],
    priced: &[LineTotals],
) -> Result<Vec<purchase_invoice_line::Model>, ServiceError> {
    let now = Utc::now();
    let mut lines = Vec::with_capacity(inputs.len());
    for (line_no, (input, totals)) in (1..).zip(inputs.iter().zip(priced)) {
        let line = gw
            .insert(purchase_invoice_line::ActiveModel {
                id: Set(Uuid::new_v4()),
                purchase_invoice_id: Set(purchase_invoice_id),
                line_no: Set(line_no),
                purchase_order_line_id: Set(input.purchase_order_line_id),
                product_id: Set(input.line.product_id),
                unit: Set(input.line.unit.clone()),
                quantity: Set(input.line.quantity),
                unit_price: Set(input.line.unit_price),
                discount_amount: Set(totals.discount_amount),
                tax_rate: Set(input.line.tax_rate),
                tax_amount: Set(totals.tax_amount),
                line_total: Set(totals.line_total),
                created_at: Set(now),
                ..Default::default()
            })
            .await?;
        lines.push(line);
    }
    Ok(lines)
}

fn price_invoice_lines(
    lines: &[InvoiceLineInput],
    shipping_amount: Decimal,
) -> Result<(Vec<LineTotals>, DocumentTotals), ServiceError> {
    let plain: Vec<LineInput> = lines.iter().map(|line| line.line.clone()).collect();
    price_lines(&plain, shipping_amount)
}

/// Moves an approved invoice whose payable is settled to `PAID`.
pub(crate) async fn mark_settled<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    purchase_invoice_id: Uuid,
) -> Result<Option<AuditRecord>, ServiceError> {
    let invoice = gw.get::<purchase_invoice::Entity>(purchase_invoice_id).await?;
    if invoice.status != PurchaseInvoiceStatus::Approved {
        return Ok(None);
    }
    let next = invoice.status.transition(PurchaseInvoiceStatus::Paid)?;
    let now = Utc::now();
    let update = purchase_invoice::ActiveModel {
        status: Set(next),
        paid_at: Set(Some(now)),
        updated_by: Set(Some(gw.context().user_id())),
        updated_at: Set(now),
        ..Default::default()
    };
    gw.update::<purchase_invoice::Entity, _>(invoice.id, update, Some(invoice.version))
        .await?;
    Ok(Some(AuditRecord::transition(
        gw.context(),
        DOCUMENT.to_string(),
        invoice.id,
        invoice.status,
        next,
    )))
}

/// Supplier invoices and their three-way match against orders and receipts.
#[derive(Clone)]
pub struct PurchaseInvoiceService {
    deps: ServiceDeps,
}

impl PurchaseInvoiceService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Over-invoiced lines are rejected before anything is persisted.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), supplier_id = %input.supplier_id))]
    pub async fn create(
        &self,
        ctx: &TenantContext,
        input: CreatePurchaseInvoice,
    ) -> Result<PurchaseInvoiceDetail, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "purchase_invoice.create", || async move {
            let txn = self.deps.begin().await?;
            let result = self.create_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let detail = self.deps.committed(outcome);
        info!(
            purchase_invoice_id = %detail.invoice.id,
            document_number = %detail.invoice.document_number,
            grand_total = %detail.invoice.grand_total,
            "purchase invoice created"
        );
        Ok(detail)
    }

    async fn create_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &CreatePurchaseInvoice,
    ) -> Result<Audited<PurchaseInvoiceDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let supplier = active_party(&gw, input.supplier_id, PartyRole::Supplier).await?;
        let (priced, totals) = price_invoice_lines(&input.lines, input.shipping_amount)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.line.product_id)).await?;

        let order = resolve_order(
            &gw,
            supplier.id,
            input.purchase_order_id,
            input.goods_receipt_id,
        )
        .await?;
        apply_lines(&gw, order.as_ref(), &input.lines, &self.deps.defaults).await?;

        let document_number =
            numbering::allocate(&gw, DOCUMENT, self.deps.defaults.document_number_width).await?;
        let now = Utc::now();
        let mut header = purchase_invoice::ActiveModel {
            id: Set(Uuid::new_v4()),
            document_number: Set(document_number),
            supplier_id: Set(supplier.id),
            purchase_order_id: Set(order.as_ref().map(|o| o.id)),
            goods_receipt_id: Set(input.goods_receipt_id),
            supplier_invoice_number: Set(input.supplier_invoice_number.clone()),
            status: Set(PurchaseInvoiceStatus::INITIAL),
            invoice_date: Set(input.invoice_date.unwrap_or_else(today)),
            due_date: Set(input.due_date),
            created_by: Set(ctx.user_id()),
            created_at: Set(now),
            approved_by: Set(None),
            approved_at: Set(None),
            rejected_by: Set(None),
            rejected_at: Set(None),
            rejection_reason: Set(None),
            cancelled_by: Set(None),
            cancelled_at: Set(None),
            cancellation_reason: Set(None),
            paid_at: Set(None),
            updated_by: Set(None),
            updated_at: Set(now),
            version: Set(1),
            ..Default::default()
        };
        set_totals(&mut header, &totals);
        let invoice = gw.insert(header).await?;
        let lines = insert_lines(&gw, invoice.id, &input.lines, &priced).await?;

        let detail = PurchaseInvoiceDetail { invoice, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), detail.invoice.id, AuditAction::Create)
            .with_after(&detail);
        Ok((detail, vec![record]))
    }

    pub async fn get(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
    ) -> Result<PurchaseInvoiceDetail, ServiceError> {
        let gw = TenantGateway::new(self.deps.db.as_ref(), ctx);
        load_detail(&gw, purchase_invoice_id).await
    }

    /// Swaps the lines of a draft invoice, re-running the quantity checks
    /// against what the old lines gave back.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn replace_lines(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
        input: ReplaceInvoiceLines,
    ) -> Result<PurchaseInvoiceDetail, ServiceError> {
        let input = &input;
        let outcome = with_retry(self.deps.retry, "purchase_invoice.replace_lines", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .replace_lines_in_txn(&txn, ctx, purchase_invoice_id, input)
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
        purchase_invoice_id: Uuid,
        input: &ReplaceInvoiceLines,
    ) -> Result<Audited<PurchaseInvoiceDetail>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let before = load_detail(&gw, purchase_invoice_id).await?;
        let invoice = &before.invoice;
        check_version(input.expected_version, "purchase invoice", invoice.id, invoice.version)?;
        if invoice.status != PurchaseInvoiceStatus::Draft {
            return Err(invalid_transition(DOCUMENT, invoice.status.to_string(), EDITED));
        }

        let shipping = input.shipping_amount.unwrap_or(invoice.shipping_amount);
        let (priced, totals) = price_invoice_lines(&input.lines, shipping)?;
        ensure_products(&gw, input.lines.iter().map(|line| line.line.product_id)).await?;

        release_lines(&gw, invoice, &before.lines).await?;
        let order = match invoice.purchase_order_id {
            Some(order_id) => Some(gw.get::<purchase_order::Entity>(order_id).await?),
            None => None,
        };
        apply_lines(&gw, order.as_ref(), &input.lines, &self.deps.defaults).await?;

        gw.delete_where::<purchase_invoice_line::Entity>(
            Condition::all().add(purchase_invoice_line::Column::PurchaseInvoiceId.eq(invoice.id)),
        )
        .await?;
        let lines = insert_lines(&gw, invoice.id, &input.lines, &priced).await?;

        let mut update = purchase_invoice::ActiveModel {
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        set_totals(&mut update, &totals);
        let invoice = gw
            .update::<purchase_invoice::Entity, _>(invoice.id, update, Some(invoice.version))
            .await?;

        let after = PurchaseInvoiceDetail { invoice, lines };
        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), after.invoice.id, AuditAction::Update)
            .with_before(&before)
            .with_after(&after);
        Ok((after, vec![record]))
    }

    /// Deletes a draft invoice and gives its quantities back.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn delete(&self, ctx: &TenantContext, purchase_invoice_id: Uuid) -> Result<(), ServiceError> {
        let outcome = with_retry(self.deps.retry, "purchase_invoice.delete", || async move {
            let txn = self.deps.begin().await?;
            let result = self.delete_in_txn(&txn, ctx, purchase_invoice_id).await;
            finish(txn, result).await
        })
        .await?;

        self.deps.committed(outcome);
        info!(%purchase_invoice_id, "purchase invoice deleted");
        Ok(())
    }

    async fn delete_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
    ) -> Result<Audited<()>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let before = load_detail(&gw, purchase_invoice_id).await?;
        if before.invoice.status != PurchaseInvoiceStatus::Draft {
            return Err(invalid_transition(
                DOCUMENT,
                before.invoice.status.to_string(),
                DELETED,
            ));
        }

        release_lines(&gw, &before.invoice, &before.lines).await?;
        gw.delete_where::<purchase_invoice_line::Entity>(
            Condition::all()
                .add(purchase_invoice_line::Column::PurchaseInvoiceId.eq(purchase_invoice_id)),
        )
        .await?;
        gw.delete::<purchase_invoice::Entity>(purchase_invoice_id).await?;

        let record = AuditRecord::new(ctx, DOCUMENT.to_string(), purchase_invoice_id, AuditAction::Delete)
            .with_before(&before);
        Ok(((), vec![record]))
    }

    pub async fn submit(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        self.transition(ctx, purchase_invoice_id, PurchaseInvoiceStatus::Submitted, TransitionPayload::default())
            .await
    }

    /// Opens the payable to the supplier.
    pub async fn approve(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        self.transition(ctx, purchase_invoice_id, PurchaseInvoiceStatus::Approved, TransitionPayload::default())
            .await
    }

    pub async fn reject(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        self.transition(
            ctx,
            purchase_invoice_id,
            PurchaseInvoiceStatus::Rejected,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    pub async fn cancel(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
        reason: impl Into<String>,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        self.transition(
            ctx,
            purchase_invoice_id,
            PurchaseInvoiceStatus::Cancelled,
            TransitionPayload::with_reason(reason),
        )
        .await
    }

    /// Pays whatever is still open on the invoice.
    pub async fn mark_paid(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        self.transition(ctx, purchase_invoice_id, PurchaseInvoiceStatus::Paid, TransitionPayload::default())
            .await
    }

    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id()))]
    pub async fn transition(
        &self,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
        target: PurchaseInvoiceStatus,
        payload: TransitionPayload,
    ) -> Result<purchase_invoice::Model, ServiceError> {
        let payload = &payload;
        let outcome = with_retry(self.deps.retry, "purchase_invoice.transition", || async move {
            let txn = self.deps.begin().await?;
            let result = self
                .transition_in_txn(&txn, ctx, purchase_invoice_id, target, payload)
                .await;
            finish(txn, result).await
        })
        .await?;

        let invoice = self.deps.committed(outcome);
        info!(
            document_number = %invoice.document_number,
            status = %invoice.status,
            "purchase invoice transitioned"
        );
        Ok(invoice)
    }

    async fn transition_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        purchase_invoice_id: Uuid,
        target: PurchaseInvoiceStatus,
        payload: &TransitionPayload,
    ) -> Result<Audited<purchase_invoice::Model>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        let invoice = gw.get::<purchase_invoice::Entity>(purchase_invoice_id).await?;
        payload.check_version("purchase invoice", invoice.id, invoice.version)?;
        let next = invoice.status.transition(target)?;

        let now = Utc::now();
        let mut update = purchase_invoice::ActiveModel {
            status: Set(next),
            updated_by: Set(Some(ctx.user_id())),
            updated_at: Set(now),
            ..Default::default()
        };
        let mut records = Vec::new();

        match next {
            PurchaseInvoiceStatus::Approved => {
                let supplier = gw.get::<party::Entity>(invoice.supplier_id).await?;
                let today = today();
                let due_date = invoice
                    .due_date
                    .unwrap_or_else(|| due_after(invoice.invoice_date, supplier.payment_term_days));
                ledger::balance::open_obligation(
                    &gw,
                    supplier.id,
                    ObligationDirection::Payable,
                    DOCUMENT,
                    invoice.id,
                    invoice.grand_total,
                    due_date,
                    today,
                )
                .await?;
                update.approved_by = Set(Some(ctx.user_id()));
                update.approved_at = Set(Some(now));
                update.due_date = Set(Some(due_date));
            }
            PurchaseInvoiceStatus::Rejected => {
                let reason = payload.required_reason()?;
                let lines = invoice_lines(&gw, invoice.id).await?;
                release_lines(&gw, &invoice, &lines).await?;
                update.rejected_by = Set(Some(ctx.user_id()));
                update.rejected_at = Set(Some(now));
                update.rejection_reason = Set(Some(reason));
            }
            PurchaseInvoiceStatus::Cancelled => {
                let reason = payload.required_reason()?;
                let lines = invoice_lines(&gw, invoice.id).await?;
                release_lines(&gw, &invoice, &lines).await?;
                ledger::balance::void_document_obligations(&gw, DOCUMENT, invoice.id, today()).await?;
                update.cancelled_by = Set(Some(ctx.user_id()));
                update.cancelled_at = Set(Some(now));
                update.cancellation_reason = Set(Some(reason));
            }
            PurchaseInvoiceStatus::Paid => {
                if let Some(record) = self.settle_remainder(&gw, &invoice).await? {
                    records.push(record);
                }
                update.paid_at = Set(Some(now));
            }
            _ => {}
        }

        let updated = gw
            .update::<purchase_invoice::Entity, _>(invoice.id, update, Some(invoice.version))
            .await?;
        records.push(AuditRecord::transition(
            ctx,
            DOCUMENT.to_string(),
            invoice.id,
            invoice.status,
            next,
        ));
        Ok((updated, records))
    }

    async fn settle_remainder<C: ConnectionTrait>(
        &self,
        gw: &TenantGateway<'_, C>,
        invoice: &purchase_invoice::Model,
    ) -> Result<Option<AuditRecord>, ServiceError> {
        let open = gw
            .all(
                party_obligation::Entity::find()
                    .filter(party_obligation::Column::DocumentType.eq(DOCUMENT))
                    .filter(party_obligation::Column::DocumentId.eq(invoice.id))
                    .filter(party_obligation::Column::Status.eq(ObligationStatus::Open)),
            )
            .await?;
        let remaining: Decimal = open.iter().map(|o| o.remaining()).sum();
        if remaining.is_zero() {
            return Ok(None);
        }

        let (receipt, _) = book_payment(
            gw,
            invoice.supplier_id,
            remaining,
            today(),
            Some(invoice.document_number.clone()),
            SettlementScope::Document {
                document_type: DOCUMENT,
                document_id: invoice.id,
            },
        )
        .await?;
        Ok(Some(
            AuditRecord::new(gw.context(), "PAYMENT", receipt.payment.id, AuditAction::Create)
                .with_after(&receipt),
        ))
    }
}
