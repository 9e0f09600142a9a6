//! Post-commit audit trail.
//!
//! Services collect [`AuditRecord`]s while a transaction runs and hand them to
//! the [`AuditDispatcher`] only after it committed. Delivery to the sink
//! happens on a background task; a full channel or a failing sink is logged
//! and counted and never reaches the caller.

mod sinks;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ServiceError;
use crate::tenancy::TenantContext;

pub use sinks::{DatabaseAuditSink, TracingAuditSink};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub tenant_id: Uuid,
    pub company_id: Uuid,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub action: AuditAction,
    pub actor: Uuid,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        ctx: &TenantContext,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        action: AuditAction,
    ) -> Self {
        Self {
            tenant_id: ctx.tenant_id(),
            company_id: ctx.company_id(),
            entity_type: entity_type.into(),
            entity_id,
            action,
            actor: ctx.user_id(),
            before: None,
            after: None,
            occurred_at: Utc::now(),
        }
    }

    /// A status change, recorded as `{"status": from}` -> `{"status": to}`.
    pub fn transition(
        ctx: &TenantContext,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        from: impl fmt::Display,
        to: impl fmt::Display,
    ) -> Self {
        let mut record = Self::new(ctx, entity_type, entity_id, AuditAction::Transition);
        record.before = Some(serde_json::json!({ "status": from.to_string() }));
        record.after = Some(serde_json::json!({ "status": to.to_string() }));
        record
    }

    pub fn with_before<T: Serialize>(mut self, value: &T) -> Self {
        self.before = snapshot(value);
        self
    }

    pub fn with_after<T: Serialize>(mut self, value: &T) -> Self {
        self.after = snapshot(value);
        self
    }
}

fn snapshot<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(error = %err, "audit snapshot could not be serialized");
            None
        }
    }
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink failed: {0}")]
    Sink(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Destination for audit records.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: &AuditRecord) -> Result<(), AuditError>;
}

/// Cheap handle used by services to enqueue records after commit.
#[derive(Debug, Clone)]
pub struct AuditDispatcher {
    sender: Option<mpsc::Sender<AuditRecord>>,
}

impl AuditDispatcher {
    /// Starts the background worker. The worker stops once every dispatcher
    /// clone is dropped and the queue is drained.
    pub fn spawn(sink: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run_audit_worker(rx, sink));
        (Self { sender: Some(tx) }, handle)
    }

    /// A dispatcher that discards everything.
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    pub fn dispatch(&self, record: AuditRecord) {
        let Some(sender) = &self.sender else {
            return;
        };

        match sender.try_send(record) {
            Ok(()) => {
                counter!("docflow_audit.enqueued", 1);
            }
            Err(TrySendError::Full(record)) => {
                warn!(
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    "audit queue full, record dropped"
                );
                counter!("docflow_audit.dropped", 1, "reason" => "full");
            }
            Err(TrySendError::Closed(record)) => {
                warn!(
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    "audit worker stopped, record dropped"
                );
                counter!("docflow_audit.dropped", 1, "reason" => "closed");
            }
        }
    }

    pub fn dispatch_all(&self, records: impl IntoIterator<Item = AuditRecord>) {
        for record in records {
            self.dispatch(record);
        }
    }
}

pub async fn run_audit_worker(mut rx: mpsc::Receiver<AuditRecord>, sink: Arc<dyn AuditSink>) {
    info!("Starting audit worker");

    while let Some(record) = rx.recv().await {
        match sink.record(&record).await {
            Ok(()) => {
                debug!(entity_id = %record.entity_id, action = %record.action, "audit recorded");
            }
            Err(err) => {
                warn!(
                    entity_type = %record.entity_type,
                    entity_id = %record.entity_id,
                    error = %err,
                    "audit sink failed"
                );
                counter!("docflow_audit.failed", 1);
            }
        }
    }

    info!("Audit worker stopped");
}
