use std::sync::Arc;

use async_trait::async_trait;
use sea_orm::{ActiveValue::Set, DatabaseConnection};
use tracing::info;
use uuid::Uuid;

use super::{AuditError, AuditRecord, AuditSink};
use crate::entities::audit_log;
use crate::tenancy::{TenantContext, TenantGateway};

/// Emits every record as a structured `tracing` event.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        info!(
            target: "docflow::audit",
            tenant_id = %record.tenant_id,
            company_id = %record.company_id,
            entity_type = %record.entity_type,
            entity_id = %record.entity_id,
            action = %record.action,
            actor = %record.actor,
            before = ?record.before,
            after = ?record.after,
            "audit"
        );
        Ok(())
    }
}

/// Persists records to `audit_logs`.
#[derive(Debug, Clone)]
pub struct DatabaseAuditSink {
    db: Arc<DatabaseConnection>,
}

impl DatabaseAuditSink {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl AuditSink for DatabaseAuditSink {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let ctx = TenantContext::new(record.tenant_id, record.company_id, record.actor)?;
        let gw = TenantGateway::new(self.db.as_ref(), &ctx);

        gw.insert(audit_log::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_type: Set(record.entity_type.clone()),
            entity_id: Set(record.entity_id),
            action: Set(record.action.to_string()),
            actor: Set(record.actor),
            before: Set(record.before.clone()),
            after: Set(record.after.clone()),
            occurred_at: Set(record.occurred_at),
            ..Default::default()
        })
        .await?;
        Ok(())
    }
}
