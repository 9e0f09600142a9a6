//! Party outstanding and overdue bookkeeping.
//!
//! Balances are derived from obligations: approving a sales order or a
//! purchase invoice opens one, cancelling voids what is left of it, and
//! payments settle it. Every obligation change is paired with an
//! [`adjust_party`] call inside the same transaction.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::enums::{DocumentType, ObligationDirection, ObligationStatus};
use crate::entities::{party, party_obligation};
use crate::errors::ServiceError;
use crate::tenancy::TenantGateway;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartyBalance {
    pub party_id: Uuid,
    pub credit_limit: Decimal,
    pub outstanding: Decimal,
    pub overdue: Decimal,
    pub available_credit: Decimal,
}

impl From<&party::Model> for PartyBalance {
    fn from(party: &party::Model) -> Self {
        Self {
            party_id: party.id,
            credit_limit: party.credit_limit,
            outstanding: party.current_outstanding,
            overdue: party.overdue_amount,
            available_credit: available_credit(party.credit_limit, party.current_outstanding),
        }
    }
}

/// Result of an advisory credit check. It never blocks on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreditCheck {
    pub party_id: Uuid,
    pub credit_limit: Decimal,
    pub outstanding: Decimal,
    pub pending: Decimal,
    pub available_credit: Decimal,
    pub exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub party_id: Uuid,
    /// `current_outstanding` as stored on the party.
    pub recorded: Decimal,
    /// Sum of unsettled open obligations.
    pub computed: Decimal,
    pub drift: Decimal,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drift.is_zero()
    }
}

/// Which open obligations a payment may settle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementScope {
    /// Oldest due date first, across all of the party's documents.
    Oldest,
    Document {
        document_type: DocumentType,
        document_id: Uuid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settlement {
    pub obligation: party_obligation::Model,
    pub amount: Decimal,
}

pub fn available_credit(credit_limit: Decimal, outstanding: Decimal) -> Decimal {
    (credit_limit - outstanding).max(Decimal::ZERO)
}

pub fn check_credit(party: &party::Model, pending: Decimal) -> CreditCheck {
    CreditCheck {
        party_id: party.id,
        credit_limit: party.credit_limit,
        outstanding: party.current_outstanding,
        pending,
        available_credit: available_credit(party.credit_limit, party.current_outstanding),
        exceeded: party.current_outstanding + pending > party.credit_limit,
    }
}

fn open_obligations_of(party_id: Uuid) -> Condition {
    Condition::all()
        .add(party_obligation::Column::PartyId.eq(party_id))
        .add(party_obligation::Column::Status.eq(ObligationStatus::Open))
}

async fn overdue_for<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    as_of: NaiveDate,
) -> Result<Decimal, ServiceError> {
    let overdue = gw
        .all(
            party_obligation::Entity::find()
                .filter(open_obligations_of(party_id))
                .filter(party_obligation::Column::DueDate.lt(as_of)),
        )
        .await?;
    Ok(overdue.iter().map(|o| o.remaining()).sum())
}

/// Moves `current_outstanding` by `delta` and recomputes `overdue_amount`
/// as of `today`. Fails rather than letting either go negative.
pub async fn adjust_party<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    delta: Decimal,
    today: NaiveDate,
) -> Result<party::Model, ServiceError> {
    let current = gw.get::<party::Entity>(party_id).await?;
    let outstanding = current.current_outstanding + delta;
    if outstanding.is_sign_negative() && !outstanding.is_zero() {
        return Err(ServiceError::InvariantViolation(format!(
            "outstanding for party {} would become {}",
            party_id, outstanding
        )));
    }

    let overdue = overdue_for(gw, party_id, today).await?;
    if overdue > outstanding {
        return Err(ServiceError::InvariantViolation(format!(
            "overdue {} for party {} exceeds outstanding {}",
            overdue, party_id, outstanding
        )));
    }

    let update = party::ActiveModel {
        current_outstanding: Set(outstanding),
        overdue_amount: Set(overdue),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    let updated = gw
        .update::<party::Entity, _>(party_id, update, Some(current.version))
        .await?;
    debug!(%party_id, %delta, %outstanding, %overdue, "party balance adjusted");
    Ok(updated)
}

/// Opens an obligation for a document and books it on the party.
///
/// Zero amounts open nothing.
#[allow(clippy::too_many_arguments)]
pub async fn open_obligation<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    direction: ObligationDirection,
    document_type: DocumentType,
    document_id: Uuid,
    amount: Decimal,
    due_date: NaiveDate,
    today: NaiveDate,
) -> Result<Option<party_obligation::Model>, ServiceError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ServiceError::InvariantViolation(format!(
            "obligation amount {} for {} {} is negative",
            amount, document_type, document_id
        )));
    }
    if amount.is_zero() {
        debug!(%document_type, %document_id, "zero total, no obligation opened");
        return Ok(None);
    }

    let now = Utc::now();
    let obligation = gw
        .insert(party_obligation::ActiveModel {
            id: Set(Uuid::new_v4()),
            party_id: Set(party_id),
            direction: Set(direction),
            document_type: Set(document_type),
            document_id: Set(document_id),
            amount: Set(amount),
            settled_amount: Set(Decimal::ZERO),
            due_date: Set(due_date),
            status: Set(ObligationStatus::Open),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        })
        .await?;

    adjust_party(gw, party_id, amount, today).await?;
    Ok(Some(obligation))
}

/// Voids whatever is still unsettled on the document's open obligations and
/// returns the amount released.
pub async fn void_document_obligations<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    document_type: DocumentType,
    document_id: Uuid,
    today: NaiveDate,
) -> Result<Decimal, ServiceError> {
    let open = gw
        .all(
            party_obligation::Entity::find()
                .filter(party_obligation::Column::DocumentType.eq(document_type))
                .filter(party_obligation::Column::DocumentId.eq(document_id))
                .filter(party_obligation::Column::Status.eq(ObligationStatus::Open)),
        )
        .await?;

    let mut released: BTreeMap<Uuid, Decimal> = BTreeMap::new();
    for obligation in &open {
        let update = party_obligation::ActiveModel {
            status: Set(ObligationStatus::Void),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        gw.update::<party_obligation::Entity, _>(obligation.id, update, Some(obligation.version))
            .await?;
        *released.entry(obligation.party_id).or_insert(Decimal::ZERO) += obligation.remaining();
    }

    let mut total = Decimal::ZERO;
    for (party_id, amount) in released {
        adjust_party(gw, party_id, -amount, today).await?;
        total += amount;
    }
    if !total.is_zero() {
        debug!(%document_type, %document_id, %total, "obligations voided");
    }
    Ok(total)
}

/// Settles `amount` against the party's open obligations and books the
/// reduction. Paying more than is open is refused.
pub async fn settle<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    amount: Decimal,
    scope: SettlementScope,
    today: NaiveDate,
) -> Result<Vec<Settlement>, ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::invalid_field(
            "amount",
            "must be greater than zero",
        ));
    }

    let mut select = party_obligation::Entity::find().filter(open_obligations_of(party_id));
    if let SettlementScope::Document {
        document_type,
        document_id,
    } = scope
    {
        select = select
            .filter(party_obligation::Column::DocumentType.eq(document_type))
            .filter(party_obligation::Column::DocumentId.eq(document_id));
    }
    let open = gw
        .all(
            select
                .order_by_asc(party_obligation::Column::DueDate)
                .order_by_asc(party_obligation::Column::CreatedAt),
        )
        .await?;

    let open_total: Decimal = open.iter().map(|o| o.remaining()).sum();
    if amount > open_total {
        return Err(ServiceError::InvariantViolation(format!(
            "payment {} exceeds open balance {} for party {}",
            amount, open_total, party_id
        )));
    }

    let mut left = amount;
    let mut settlements = Vec::new();
    for obligation in open {
        if left.is_zero() {
            break;
        }
        let applied = left.min(obligation.remaining());
        if applied.is_zero() {
            continue;
        }
        let settled_amount = obligation.settled_amount + applied;
        let status = if settled_amount >= obligation.amount {
            ObligationStatus::Settled
        } else {
            ObligationStatus::Open
        };
        let update = party_obligation::ActiveModel {
            settled_amount: Set(settled_amount),
            status: Set(status),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        let updated = gw
            .update::<party_obligation::Entity, _>(obligation.id, update, Some(obligation.version))
            .await?;
        settlements.push(Settlement {
            obligation: updated,
            amount: applied,
        });
        left -= applied;
    }

    adjust_party(gw, party_id, -amount, today).await?;
    Ok(settlements)
}

pub async fn party_balance<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
) -> Result<PartyBalance, ServiceError> {
    let party = gw.get::<party::Entity>(party_id).await?;
    Ok(PartyBalance::from(&party))
}

/// Recomputes `overdue_amount` for every party in scope. Returns how many
/// parties changed.
pub async fn refresh_overdue<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    as_of: NaiveDate,
) -> Result<usize, ServiceError> {
    let parties = gw.all(party::Entity::find()).await?;
    let mut changed = 0;
    for party in parties {
        let overdue = overdue_for(gw, party.id, as_of).await?;
        if overdue == party.overdue_amount {
            continue;
        }
        let update = party::ActiveModel {
            overdue_amount: Set(overdue),
            updated_at: Set(Utc::now()),
            ..Default::default()
        };
        gw.update::<party::Entity, _>(party.id, update, Some(party.version))
            .await?;
        changed += 1;
    }
    info!(
        tenant_id = %gw.context().tenant_id(),
        company_id = %gw.context().company_id(),
        %as_of,
        changed,
        "overdue amounts refreshed"
    );
    Ok(changed)
}

/// Compares the stored outstanding with the obligation sum. Read-only.
pub async fn reconcile_party<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
) -> Result<ReconciliationReport, ServiceError> {
    let party = gw.get::<party::Entity>(party_id).await?;
    let open = gw
        .all(party_obligation::Entity::find().filter(open_obligations_of(party_id)))
        .await?;
    let computed: Decimal = open.iter().map(|o| o.remaining()).sum();
    let report = ReconciliationReport {
        party_id,
        recorded: party.current_outstanding,
        computed,
        drift: party.current_outstanding - computed,
    };
    if !report.is_consistent() {
        warn!(%party_id, recorded = %report.recorded, %computed, "outstanding drift detected");
    }
    Ok(report)
}
