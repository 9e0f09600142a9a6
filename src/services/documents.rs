//! Document-type agnostic entry points over the typed services.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{info, instrument};
use uuid::Uuid;

use super::catalog::CatalogService;
use super::deliveries::{CreateDelivery, DeliveryDetail, DeliveryService};
use super::goods_receipts::{CreateGoodsReceipt, GoodsReceiptDetail, GoodsReceiptService};
use super::parties::PartyService;
use super::payments::PaymentService;
use super::purchase_invoices::{
    CreatePurchaseInvoice, PurchaseInvoiceDetail, PurchaseInvoiceService,
};
use super::purchase_orders::{CreatePurchaseOrder, PurchaseOrderDetail, PurchaseOrderService};
use super::sales_orders::{CreateSalesOrder, SalesOrderDetail, SalesOrderService};
use super::settings::SettingsService;
use super::{ServiceDeps, TransitionPayload};
use crate::audit::{AuditDispatcher, AuditSink, DatabaseAuditSink, TracingAuditSink};
use crate::config::AppConfig;
use crate::db;
use crate::entities::enums::{
    DeliveryStatus, DocumentType, GoodsReceiptStatus, PurchaseInvoiceStatus, PurchaseOrderStatus,
    SalesOrderStatus,
};
use crate::errors::ServiceError;
use crate::ledger::{PartyBalance, QuantityStatusReport};
use crate::tenancy::TenantContext;
use crate::workflow::StatusMachine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreateDocument {
    SalesOrder(CreateSalesOrder),
    Delivery(CreateDelivery),
    PurchaseOrder(CreatePurchaseOrder),
    GoodsReceipt(CreateGoodsReceipt),
    PurchaseInvoice(CreatePurchaseInvoice),
}

impl CreateDocument {
    pub fn document_type(&self) -> DocumentType {
        match self {
            CreateDocument::SalesOrder(_) => DocumentType::SalesOrder,
            CreateDocument::Delivery(_) => DocumentType::Delivery,
            CreateDocument::PurchaseOrder(_) => DocumentType::PurchaseOrder,
            CreateDocument::GoodsReceipt(_) => DocumentType::GoodsReceipt,
            CreateDocument::PurchaseInvoice(_) => DocumentType::PurchaseInvoice,
        }
    }
}

/// A document header with its lines.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "document_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Document {
    SalesOrder(SalesOrderDetail),
    Delivery(DeliveryDetail),
    PurchaseOrder(PurchaseOrderDetail),
    GoodsReceipt(GoodsReceiptDetail),
    PurchaseInvoice(PurchaseInvoiceDetail),
}

impl Document {
    pub fn document_type(&self) -> DocumentType {
        match self {
            Document::SalesOrder(_) => DocumentType::SalesOrder,
            Document::Delivery(_) => DocumentType::Delivery,
            Document::PurchaseOrder(_) => DocumentType::PurchaseOrder,
            Document::GoodsReceipt(_) => DocumentType::GoodsReceipt,
            Document::PurchaseInvoice(_) => DocumentType::PurchaseInvoice,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Document::SalesOrder(d) => d.order.id,
            Document::Delivery(d) => d.delivery.id,
            Document::PurchaseOrder(d) => d.order.id,
            Document::GoodsReceipt(d) => d.receipt.id,
            Document::PurchaseInvoice(d) => d.invoice.id,
        }
    }

    pub fn document_number(&self) -> &str {
        match self {
            Document::SalesOrder(d) => &d.order.document_number,
            Document::Delivery(d) => &d.delivery.document_number,
            Document::PurchaseOrder(d) => &d.order.document_number,
            Document::GoodsReceipt(d) => &d.receipt.document_number,
            Document::PurchaseInvoice(d) => &d.invoice.document_number,
        }
    }

    /// Status in its wire form, e.g. `IN_TRANSIT`.
    pub fn status(&self) -> String {
        match self {
            Document::SalesOrder(d) => d.order.status.to_string(),
            Document::Delivery(d) => d.delivery.status.to_string(),
            Document::PurchaseOrder(d) => d.order.status.to_string(),
            Document::GoodsReceipt(d) => d.receipt.status.to_string(),
            Document::PurchaseInvoice(d) => d.invoice.status.to_string(),
        }
    }

    pub fn version(&self) -> i32 {
        match self {
            Document::SalesOrder(d) => d.order.version,
            Document::Delivery(d) => d.delivery.version,
            Document::PurchaseOrder(d) => d.order.version,
            Document::GoodsReceipt(d) => d.receipt.version,
            Document::PurchaseInvoice(d) => d.invoice.version,
        }
    }

    pub fn reference(&self) -> DocumentRef {
        DocumentRef::new(self.document_type(), self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_type: DocumentType,
    pub id: Uuid,
}

impl DocumentRef {
    pub fn new(document_type: DocumentType, id: Uuid) -> Self {
        Self { document_type, id }
    }
}

/// Every service of the engine, built over one connection pool and one
/// audit dispatcher.
#[derive(Clone)]
pub struct DocumentEngine {
    pub catalog: CatalogService,
    pub parties: PartyService,
    pub settings: SettingsService,
    pub sales_orders: SalesOrderService,
    pub deliveries: DeliveryService,
    pub purchase_orders: PurchaseOrderService,
    pub goods_receipts: GoodsReceiptService,
    pub purchase_invoices: PurchaseInvoiceService,
    pub payments: PaymentService,
}

impl DocumentEngine {
    pub fn new(deps: ServiceDeps) -> Self {
        Self {
            catalog: CatalogService::new(deps.clone()),
            parties: PartyService::new(deps.clone()),
            settings: SettingsService::new(deps.clone()),
            sales_orders: SalesOrderService::new(deps.clone()),
            deliveries: DeliveryService::new(deps.clone()),
            purchase_orders: PurchaseOrderService::new(deps.clone()),
            goods_receipts: GoodsReceiptService::new(deps.clone()),
            purchase_invoices: PurchaseInvoiceService::new(deps.clone()),
            payments: PaymentService::new(deps),
        }
    }

    /// Connects, optionally migrates and starts the audit worker selected by
    /// `audit_sink`. The returned handle finishes once every engine clone is
    /// dropped and the queue is drained.
    pub async fn from_config(
        cfg: &AppConfig,
    ) -> Result<(Self, Option<JoinHandle<()>>), ServiceError> {
        let pool = Arc::new(db::establish_connection_from_app_config(cfg).await?);
        if cfg.auto_migrate {
            db::run_migrations(&pool).await?;
        }

        let sink: Option<Arc<dyn AuditSink>> = match cfg.audit_sink.to_ascii_lowercase().as_str() {
            "database" => Some(Arc::new(DatabaseAuditSink::new(pool.clone()))),
            "none" => None,
            _ => Some(Arc::new(TracingAuditSink)),
        };
        let (audit, worker) = match sink {
            Some(sink) => {
                let (dispatcher, handle) = AuditDispatcher::spawn(sink, cfg.audit_channel_capacity);
                (dispatcher, Some(handle))
            }
            None => (AuditDispatcher::disabled(), None),
        };

        info!(
            environment = %cfg.environment,
            audit_sink = %cfg.audit_sink,
            "document engine ready"
        );
        Ok((Self::new(ServiceDeps::from_config(pool, audit, cfg)), worker))
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), document_type = %input.document_type()))]
    pub async fn create_document(
        &self,
        ctx: &TenantContext,
        input: CreateDocument,
    ) -> Result<Document, ServiceError> {
        Ok(match input {
            CreateDocument::SalesOrder(input) => {
                Document::SalesOrder(self.sales_orders.create(ctx, input).await?)
            }
            CreateDocument::Delivery(input) => {
                Document::Delivery(self.deliveries.create(ctx, input).await?)
            }
            CreateDocument::PurchaseOrder(input) => {
                Document::PurchaseOrder(self.purchase_orders.create(ctx, input).await?)
            }
            CreateDocument::GoodsReceipt(input) => {
                Document::GoodsReceipt(self.goods_receipts.create(ctx, input).await?)
            }
            CreateDocument::PurchaseInvoice(input) => {
                Document::PurchaseInvoice(self.purchase_invoices.create(ctx, input).await?)
            }
        })
    }

    pub async fn get_document(
        &self,
        ctx: &TenantContext,
        document: DocumentRef,
    ) -> Result<Document, ServiceError> {
        let id = document.id;
        Ok(match document.document_type {
            DocumentType::SalesOrder => Document::SalesOrder(self.sales_orders.get(ctx, id).await?),
            DocumentType::Delivery => Document::Delivery(self.deliveries.get(ctx, id).await?),
            DocumentType::PurchaseOrder => {
                Document::PurchaseOrder(self.purchase_orders.get(ctx, id).await?)
            }
            DocumentType::GoodsReceipt => {
                Document::GoodsReceipt(self.goods_receipts.get(ctx, id).await?)
            }
            DocumentType::PurchaseInvoice => {
                Document::PurchaseInvoice(self.purchase_invoices.get(ctx, id).await?)
            }
        })
    }

    /// Moves a document to the state named by `target` (e.g. `"APPROVED"`)
    /// and returns it as stored afterwards.
    #[instrument(skip(self, ctx, payload), fields(tenant_id = %ctx.tenant_id(), document_type = %document.document_type, document_id = %document.id))]
    pub async fn transition_document(
        &self,
        ctx: &TenantContext,
        document: DocumentRef,
        target: &str,
        payload: TransitionPayload,
    ) -> Result<Document, ServiceError> {
        let id = document.id;
        match document.document_type {
            DocumentType::SalesOrder => {
                let target = SalesOrderStatus::parse(target)?;
                self.sales_orders.transition(ctx, id, target, payload).await?;
            }
            DocumentType::Delivery => {
                let target = DeliveryStatus::parse(target)?;
                self.deliveries.transition(ctx, id, target, payload).await?;
            }
            DocumentType::PurchaseOrder => {
                let target = PurchaseOrderStatus::parse(target)?;
                self.purchase_orders.transition(ctx, id, target, payload).await?;
            }
            DocumentType::GoodsReceipt => {
                let target = GoodsReceiptStatus::parse(target)?;
                self.goods_receipts.transition(ctx, id, target, payload).await?;
            }
            DocumentType::PurchaseInvoice => {
                let target = PurchaseInvoiceStatus::parse(target)?;
                self.purchase_invoices.transition(ctx, id, target, payload).await?;
            }
        }
        self.get_document(ctx, document).await
    }

    /// Receipt and invoice progress of a purchase order under the tenant's
    /// current quantity policy.
    pub async fn effective_quantity_status(
        &self,
        ctx: &TenantContext,
        purchase_order_id: Uuid,
    ) -> Result<QuantityStatusReport, ServiceError> {
        self.purchase_orders.quantity_status(ctx, purchase_order_id).await
    }

    pub async fn party_balance(
        &self,
        ctx: &TenantContext,
        party_id: Uuid,
    ) -> Result<PartyBalance, ServiceError> {
        self.parties.balance(ctx, party_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    use crate::services::LineInput;

    #[test]
    fn create_document_is_tagged_by_type() {
        let customer = Uuid::new_v4();
        let product = Uuid::new_v4();
        let input = CreateDocument::SalesOrder(CreateSalesOrder::new(
            customer,
            vec![LineInput::new(product, dec!(2), dec!(10))],
        ));

        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["document_type"], "SALES_ORDER");
        assert_eq!(json["customer_id"], customer.to_string());

        let back: CreateDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back.document_type(), DocumentType::SalesOrder);
        assert_matches!(back, CreateDocument::SalesOrder(order) if order.customer_id == customer);
    }

    #[test]
    fn unknown_document_type_is_rejected() {
        let json = serde_json::json!({ "document_type": "CREDIT_NOTE" });
        assert!(serde_json::from_value::<CreateDocument>(json).is_err());
    }

    #[test]
    fn document_ref_round_trips_through_json() {
        let reference = DocumentRef::new(DocumentType::GoodsReceipt, Uuid::new_v4());
        let json = serde_json::to_string(&reference).unwrap();
        assert!(json.contains("\"GOODS_RECEIPT\""));
        assert_eq!(serde_json::from_str::<DocumentRef>(&json).unwrap(), reference);
    }
}
