//! Transactional document services.
//!
//! Every public operation runs as one database transaction through
//! [`with_retry`](crate::db::with_retry): a lost version race re-runs the
//! whole closure from fresh reads. Audit records are collected while the
//! transaction runs and handed to the dispatcher only after commit.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditDispatcher, AuditRecord};
use crate::config::AppConfig;
use crate::db::RetryPolicy;
use crate::entities::product;
use crate::errors::ServiceError;
use crate::tenancy::TenantGateway;
use crate::totals::{self, DocumentTotals, LineAmounts, LineTotals};

pub mod catalog;
pub mod deliveries;
pub mod documents;
pub mod goods_receipts;
pub mod parties;
pub mod payments;
pub mod purchase_invoices;
pub mod purchase_orders;
pub mod sales_orders;
pub mod settings;

pub use settings::{EffectiveSettings, WorkflowDefaults};

/// Result of a transaction body: the value plus the audit trail to emit once
/// it has committed.
pub(crate) type Audited<T> = (T, Vec<AuditRecord>);

/// Shared handles every service is built from.
#[derive(Clone)]
pub struct ServiceDeps {
    pub db: Arc<DatabaseConnection>,
    pub audit: AuditDispatcher,
    pub retry: RetryPolicy,
    pub defaults: WorkflowDefaults,
}

impl ServiceDeps {
    pub fn new(db: Arc<DatabaseConnection>, audit: AuditDispatcher) -> Self {
        Self {
            db,
            audit,
            retry: RetryPolicy::default(),
            defaults: WorkflowDefaults::default(),
        }
    }

    pub fn from_config(db: Arc<DatabaseConnection>, audit: AuditDispatcher, cfg: &AppConfig) -> Self {
        Self {
            db,
            audit,
            retry: RetryPolicy::from_config(cfg),
            defaults: WorkflowDefaults::from(cfg),
        }
    }

    pub(crate) async fn begin(&self) -> Result<DatabaseTransaction, ServiceError> {
        self.db.begin().await.map_err(ServiceError::db_error)
    }

    /// Emits the audit trail of a committed transaction and returns its value.
    pub(crate) fn committed<T>(&self, (value, records): Audited<T>) -> T {
        self.audit.dispatch_all(records);
        value
    }
}

/// Optional data carried by a status change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Required for cancellations and rejections.
    pub reason: Option<String>,
    /// When set, the document must still be at this version.
    pub expected_version: Option<i32>,
}

impl TransitionPayload {
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            expected_version: None,
        }
    }

    pub(crate) fn required_reason(&self) -> Result<String, ServiceError> {
        match self.reason.as_deref().map(str::trim) {
            Some(reason) if !reason.is_empty() => Ok(reason.to_string()),
            _ => Err(ServiceError::invalid_field("reason", "is required")),
        }
    }

    pub(crate) fn check_version(&self, label: &str, id: Uuid, current: i32) -> Result<(), ServiceError> {
        check_version(self.expected_version, label, id, current)
    }
}

/// A stale caller-held version is a conflict, not a retryable race.
pub(crate) fn check_version(
    expected: Option<i32>,
    label: &str,
    id: Uuid,
    current: i32,
) -> Result<(), ServiceError> {
    match expected {
        Some(expected) if expected != current => Err(ServiceError::Conflict(format!(
            "{} {} is at version {}, expected {}",
            label, id, current, expected
        ))),
        _ => Ok(()),
    }
}

/// One priced line of a sales order, purchase order or purchase invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineInput {
    pub product_id: Uuid,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    #[serde(default)]
    pub discount_amount: Decimal,
    #[serde(default)]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub lot_number: Option<String>,
}

impl LineInput {
    pub fn new(product_id: Uuid, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
            discount_amount: Decimal::ZERO,
            tax_rate: Decimal::ZERO,
            unit: None,
            lot_number: None,
        }
    }

    pub fn with_discount(mut self, discount_amount: Decimal) -> Self {
        self.discount_amount = discount_amount;
        self
    }

    pub fn with_tax_rate(mut self, tax_rate: Decimal) -> Self {
        self.tax_rate = tax_rate;
        self
    }

    pub(crate) fn amounts(&self) -> LineAmounts {
        LineAmounts {
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount_amount: self.discount_amount,
            tax_rate: self.tax_rate,
        }
    }
}

/// Prices every line and the document. At least one line is required.
pub(crate) fn price_lines(
    lines: &[LineInput],
    shipping_amount: Decimal,
) -> Result<(Vec<LineTotals>, DocumentTotals), ServiceError> {
    if lines.is_empty() {
        return Err(ServiceError::invalid_field(
            "lines",
            "at least one line is required",
        ));
    }
    let priced = lines
        .iter()
        .map(|line| totals::compute_line(&line.amounts()))
        .collect::<Result<Vec<_>, _>>()?;
    let document = totals::compute_document(&priced, shipping_amount)?;
    Ok((priced, document))
}

/// Every referenced product must exist in scope and be active.
pub(crate) async fn ensure_products<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    product_ids: impl IntoIterator<Item = Uuid>,
) -> Result<(), ServiceError> {
    let distinct: BTreeSet<Uuid> = product_ids.into_iter().collect();
    for id in distinct {
        let product = gw.get::<product::Entity>(id).await?;
        if !product.is_active {
            return Err(ServiceError::ValidationError(format!(
                "product {} is inactive",
                product.code
            )));
        }
    }
    Ok(())
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn due_after(from: NaiveDate, payment_term_days: i32) -> NaiveDate {
    from + Duration::days(i64::from(payment_term_days.max(0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use rust_decimal_macros::dec;

    #[test]
    fn pricing_requires_lines() {
        let err = price_lines(&[], Decimal::ZERO).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidField { ref field, .. } if field == "lines"));
    }

    #[test]
    fn pricing_sums_lines_and_shipping() {
        let lines = vec![
            LineInput::new(Uuid::new_v4(), dec!(2), dec!(50)).with_tax_rate(dec!(10)),
            LineInput::new(Uuid::new_v4(), dec!(1), dec!(20)).with_discount(dec!(5)),
        ];
        let (priced, totals) = price_lines(&lines, dec!(7)).unwrap();
        assert_eq!(priced.len(), 2);
        assert_eq!(priced[0].line_total, dec!(110));
        assert_eq!(totals.grand_total, dec!(132));
    }

    #[test]
    fn stale_expected_version_is_a_conflict() {
        let id = Uuid::new_v4();
        assert!(check_version(None, "sales order", id, 4).is_ok());
        assert!(check_version(Some(4), "sales order", id, 4).is_ok());
        let err = check_version(Some(3), "sales order", id, 4).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(!err.is_retryable());
    }

    #[test]
    fn reason_must_not_be_blank() {
        assert!(TransitionPayload::default().required_reason().is_err());
        assert!(TransitionPayload::with_reason("  ").required_reason().is_err());
        assert_eq!(
            TransitionPayload::with_reason(" damaged ").required_reason().unwrap(),
            "damaged"
        );
    }

    #[test]
    fn due_date_adds_terms() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 30).unwrap();
        assert_eq!(due_after(day, 2), NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
        assert_eq!(due_after(day, -5), day);
    }
}
