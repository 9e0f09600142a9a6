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

use super::purchase_invoices::mark_settled;
use super::{today, Audited, ServiceDeps};
use crate::audit::{AuditAction, AuditRecord};
use crate::db::{finish, with_retry};
use crate::entities::enums::{DocumentType, ObligationStatus};
use crate::entities::{party, payment, payment_allocation};
use crate::errors::ServiceError;
use crate::ledger::balance::{self, Settlement};
use crate::ledger::SettlementScope;
use crate::tenancy::{TenantContext, TenantGateway};

fn oldest_first() -> SettlementScope {
    SettlementScope::Oldest
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RecordPayment {
    pub party_id: Uuid,
    pub amount: Decimal,
    #[serde(default)]
    pub payment_date: Option<NaiveDate>,
    #[validate(length(max = 128))]
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default = "oldest_first")]
    pub scope: SettlementScope,
}

impl RecordPayment {
    pub fn new(party_id: Uuid, amount: Decimal) -> Self {
        Self {
            party_id,
            amount,
            payment_date: None,
            reference: None,
            scope: SettlementScope::Oldest,
        }
    }

    pub fn for_document(mut self, document_type: DocumentType, document_id: Uuid) -> Self {
        self.scope = SettlementScope::Document {
            document_type,
            document_id,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentReceipt {
    pub payment: payment::Model,
    pub allocations: Vec<payment_allocation::Model>,
}

/// Settles obligations and persists the payment with one allocation per
/// obligation touched. Document statuses are left to the caller.
pub(crate) async fn book_payment<C: ConnectionTrait>(
    gw: &TenantGateway<'_, C>,
    party_id: Uuid,
    amount: Decimal,
    payment_date: NaiveDate,
    reference: Option<String>,
    scope: SettlementScope,
) -> Result<(PaymentReceipt, Vec<Settlement>), ServiceError> {
    let settlements = balance::settle(gw, party_id, amount, scope, today()).await?;

    let now = Utc::now();
    let payment = gw
        .insert(payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            party_id: Set(party_id),
            amount: Set(amount),
            payment_date: Set(payment_date),
            reference: Set(reference),
            created_by: Set(gw.context().user_id()),
            created_at: Set(now),
            ..Default::default()
        })
        .await?;

    let mut allocations = Vec::with_capacity(settlements.len());
    for settlement in &settlements {
        let allocation = gw
            .insert(payment_allocation::ActiveModel {
                id: Set(Uuid::new_v4()),
                payment_id: Set(payment.id),
                obligation_id: Set(settlement.obligation.id),
                amount: Set(settlement.amount),
                created_at: Set(now),
                ..Default::default()
            })
            .await?;
        allocations.push(allocation);
    }

    Ok((PaymentReceipt { payment, allocations }, settlements))
}

#[derive(Clone)]
pub struct PaymentService {
    deps: ServiceDeps,
}

impl PaymentService {
    pub fn new(deps: ServiceDeps) -> Self {
        Self { deps }
    }

    /// Records money received from a customer or paid to a supplier.
    ///
    /// An approved purchase invoice whose payable becomes fully settled moves
    /// to `PAID` in the same transaction.
    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id(), party_id = %input.party_id, amount = %input.amount))]
    pub async fn record_payment(
        &self,
        ctx: &TenantContext,
        input: RecordPayment,
    ) -> Result<PaymentReceipt, ServiceError> {
        input.validate()?;

        let input = &input;
        let outcome = with_retry(self.deps.retry, "payment.record", || async move {
            let txn = self.deps.begin().await?;
            let result = self.record_in_txn(&txn, ctx, input).await;
            finish(txn, result).await
        })
        .await?;

        let receipt = self.deps.committed(outcome);
        info!(
            payment_id = %receipt.payment.id,
            allocations = receipt.allocations.len(),
            "payment recorded"
        );
        Ok(receipt)
    }

    async fn record_in_txn(
        &self,
        txn: &DatabaseTransaction,
        ctx: &TenantContext,
        input: &RecordPayment,
    ) -> Result<Audited<PaymentReceipt>, ServiceError> {
        let gw = TenantGateway::new(txn, ctx);
        gw.get::<party::Entity>(input.party_id).await?;

        let (receipt, settlements) = book_payment(
            &gw,
            input.party_id,
            input.amount,
            input.payment_date.unwrap_or_else(today),
            input.reference.clone(),
            input.scope,
        )
        .await?;

        let mut records = vec![
            AuditRecord::new(ctx, "PAYMENT", receipt.payment.id, AuditAction::Create).with_after(&receipt),
        ];
        for settlement in &settlements {
            let obligation = &settlement.obligation;
            if obligation.status == ObligationStatus::Settled
                && obligation.document_type == DocumentType::PurchaseInvoice
            {
                if let Some(record) = mark_settled(&gw, obligation.document_id).await? {
                    records.push(record);
                }
            }
        }
        Ok((receipt, records))
    }

    pub async fn list_for_party(
        &self,
        ctx: &TenantContext,
        party_id: Uuid,
    ) -> Result<Vec<payment::Model>, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .all(
                payment::Entity::find()
                    .filter(payment::Column::PartyId.eq(party_id))
                    .order_by_asc(payment::Column::CreatedAt),
            )
            .await
    }

    pub async fn allocations(
        &self,
        ctx: &TenantContext,
        payment_id: Uuid,
    ) -> Result<Vec<payment_allocation::Model>, ServiceError> {
        TenantGateway::new(self.deps.db.as_ref(), ctx)
            .all(
                payment_allocation::Entity::find()
                    .filter(payment_allocation::Column::PaymentId.eq(payment_id))
                    .order_by_asc(payment_allocation::Column::CreatedAt),
            )
            .await
    }
}
