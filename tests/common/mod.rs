#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sea_orm::DatabaseConnection;
use tokio::task::JoinHandle;
use uuid::Uuid;

use docflow::audit::{AuditDispatcher, AuditError, AuditRecord, AuditSink};
use docflow::config::AppConfig;
use docflow::db;
use docflow::entities::enums::PartyType;
use docflow::entities::{party, product};
use docflow::services::catalog::CreateProduct;
use docflow::services::parties::CreateParty;
use docflow::services::purchase_orders::{CreatePurchaseOrder, PurchaseOrderDetail};
use docflow::services::sales_orders::{CreateSalesOrder, SalesOrderDetail};
use docflow::{DocumentEngine, LineInput, ServiceDeps, TenantContext};

/// Keeps every record it receives so tests can inspect the audit trail.
#[derive(Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Engine over a fresh in-memory SQLite database.
pub struct TestEngine {
    pub engine: DocumentEngine,
    pub db: Arc<DatabaseConnection>,
    pub audit: Arc<RecordingAuditSink>,
    _worker: JoinHandle<()>,
}

impl TestEngine {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(configure: impl FnOnce(&mut AppConfig)) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // A single connection keeps the in-memory database alive and shared.
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.transaction_retry_backoff_ms = 1;
        configure(&mut cfg);

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations");
        let db = Arc::new(pool);

        let audit = Arc::new(RecordingAuditSink::default());
        let (dispatcher, worker) = AuditDispatcher::spawn(audit.clone(), 1024);
        let engine = DocumentEngine::new(ServiceDeps::from_config(db.clone(), dispatcher, &cfg));

        Self {
            engine,
            db,
            audit,
            _worker: worker,
        }
    }

    /// Waits for the background worker to deliver at least `count` records.
    pub async fn audit_records(&self, count: usize) -> Vec<AuditRecord> {
        for _ in 0..200 {
            let records = self.audit.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.audit.records()
    }

    pub async fn customer(
        &self,
        ctx: &TenantContext,
        credit_limit: Decimal,
        payment_term_days: i32,
    ) -> party::Model {
        self.party(ctx, PartyType::Customer, credit_limit, payment_term_days)
            .await
    }

    pub async fn supplier(&self, ctx: &TenantContext) -> party::Model {
        self.party(ctx, PartyType::Supplier, Decimal::ZERO, 30).await
    }

    pub async fn party(
        &self,
        ctx: &TenantContext,
        party_type: PartyType,
        credit_limit: Decimal,
        payment_term_days: i32,
    ) -> party::Model {
        self.engine
            .parties
            .create(
                ctx,
                CreateParty {
                    code: unique_code("P"),
                    name: format!("{} party", party_type),
                    party_type,
                    credit_limit,
                    payment_term_days,
                },
            )
            .await
            .expect("failed to create party")
    }

    pub async fn product(&self, ctx: &TenantContext) -> product::Model {
        self.engine
            .catalog
            .create_product(
                ctx,
                CreateProduct {
                    code: unique_code("SKU"),
                    name: "Widget".to_string(),
                    unit: Some("pcs".to_string()),
                },
            )
            .await
            .expect("failed to create product")
    }

    pub async fn draft_sales_order(
        &self,
        ctx: &TenantContext,
        customer_id: Uuid,
        lines: Vec<LineInput>,
    ) -> SalesOrderDetail {
        self.engine
            .sales_orders
            .create(ctx, CreateSalesOrder::new(customer_id, lines))
            .await
            .expect("failed to create sales order")
    }

    pub async fn approved_sales_order(
        &self,
        ctx: &TenantContext,
        customer_id: Uuid,
        lines: Vec<LineInput>,
    ) -> SalesOrderDetail {
        let draft = self.draft_sales_order(ctx, customer_id, lines).await;
        let orders = &self.engine.sales_orders;
        orders.submit(ctx, draft.order.id).await.expect("submit");
        orders.approve(ctx, draft.order.id).await.expect("approve");
        orders.get(ctx, draft.order.id).await.expect("reload")
    }

    pub async fn approved_purchase_order(
        &self,
        ctx: &TenantContext,
        supplier_id: Uuid,
        lines: Vec<LineInput>,
    ) -> PurchaseOrderDetail {
        let orders = &self.engine.purchase_orders;
        let draft = orders
            .create(ctx, CreatePurchaseOrder::new(supplier_id, lines))
            .await
            .expect("failed to create purchase order");
        orders.submit(ctx, draft.order.id).await.expect("submit");
        orders.approve(ctx, draft.order.id).await.expect("approve");
        orders.get(ctx, draft.order.id).await.expect("reload")
    }
}

pub fn tenant() -> TenantContext {
    TenantContext::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()).expect("valid context")
}

/// Another company of the same tenant.
pub fn sibling_company(ctx: &TenantContext) -> TenantContext {
    TenantContext::new(ctx.tenant_id(), Uuid::new_v4(), ctx.user_id()).expect("valid context")
}

pub fn unique_code(prefix: &str) -> String {
    format!("{}-{}", prefix, &Uuid::new_v4().simple().to_string()[..8])
}
