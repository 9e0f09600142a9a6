mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use common::{tenant, TestEngine};
use docflow::entities::enums::{DocumentType, ObligationStatus, PurchaseInvoiceStatus};
use docflow::entities::party_obligation;
use docflow::services::payments::RecordPayment;
use docflow::services::purchase_invoices::{CreatePurchaseInvoice, InvoiceLineInput};
use docflow::{LineInput, ServiceError, TenantContext};

async fn approved_invoice(
    app: &TestEngine,
    ctx: &TenantContext,
    supplier_id: uuid::Uuid,
    amount: Decimal,
) -> docflow::entities::purchase_invoice::Model {
    let product = app.product(ctx).await;
    let invoices = &app.engine.purchase_invoices;
    let draft = invoices
        .create(
            ctx,
            CreatePurchaseInvoice::new(
                supplier_id,
                vec![InvoiceLineInput::unmatched(LineInput::new(product.id, dec!(1), amount))],
            ),
        )
        .await
        .unwrap();
    invoices.submit(ctx, draft.invoice.id).await.unwrap();
    invoices.approve(ctx, draft.invoice.id).await.unwrap()
}

async fn obligation_of(app: &TestEngine, document_id: uuid::Uuid) -> party_obligation::Model {
    party_obligation::Entity::find()
        .filter(party_obligation::Column::DocumentId.eq(document_id))
        .one(app.db.as_ref())
        .await
        .unwrap()
        .expect("obligation")
}

#[tokio::test]
async fn payments_settle_oldest_obligations_first() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(10000), 30).await;
    let product = app.product(&ctx).await;

    let first = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(100))])
        .await;
    let second = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(60))])
        .await;

    let receipt = app
        .engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, dec!(130)))
        .await
        .unwrap();
    assert_eq!(receipt.payment.amount, dec!(130));
    assert_eq!(receipt.allocations.len(), 2);
    let allocated: Decimal = receipt.allocations.iter().map(|a| a.amount).sum();
    assert_eq!(allocated, dec!(130));

    let settled = obligation_of(&app, first.order.id).await;
    assert_eq!(settled.status, ObligationStatus::Settled);
    let partial = obligation_of(&app, second.order.id).await;
    assert_eq!(partial.status, ObligationStatus::Open);
    assert_eq!(partial.settled_amount, dec!(30));

    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(30));

    let history = app.engine.payments.list_for_party(&ctx, customer.id).await.unwrap();
    assert_eq!(history.len(), 1);
    let allocations = app
        .engine
        .payments
        .allocations(&ctx, receipt.payment.id)
        .await
        .unwrap();
    assert_eq!(allocations.len(), 2);
}

#[tokio::test]
async fn over_payment_and_non_positive_amounts_are_refused() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(10000), 30).await;
    let product = app.product(&ctx).await;
    app.approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(50))])
        .await;

    let err = app
        .engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, dec!(50.01)))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvariantViolation(_));

    let err = app
        .engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, Decimal::ZERO))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "amount");

    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(50));
    assert!(app
        .engine
        .payments
        .list_for_party(&ctx, customer.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn settling_an_invoice_payable_marks_it_paid() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let supplier = app.supplier(&ctx).await;
    let invoice = approved_invoice(&app, &ctx, supplier.id, dec!(80)).await;
    assert_eq!(invoice.status, PurchaseInvoiceStatus::Approved);
    assert_eq!(
        invoice.due_date,
        Some(invoice.invoice_date + Duration::days(30))
    );

    let payments = &app.engine.payments;
    payments
        .record_payment(
            &ctx,
            RecordPayment::new(supplier.id, dec!(30))
                .for_document(DocumentType::PurchaseInvoice, invoice.id),
        )
        .await
        .unwrap();
    let reloaded = app.engine.purchase_invoices.get(&ctx, invoice.id).await.unwrap();
    assert_eq!(reloaded.invoice.status, PurchaseInvoiceStatus::Approved);

    payments
        .record_payment(
            &ctx,
            RecordPayment::new(supplier.id, dec!(50))
                .for_document(DocumentType::PurchaseInvoice, invoice.id),
        )
        .await
        .unwrap();
    let reloaded = app.engine.purchase_invoices.get(&ctx, invoice.id).await.unwrap();
    assert_eq!(reloaded.invoice.status, PurchaseInvoiceStatus::Paid);
    assert!(reloaded.invoice.paid_at.is_some());

    let balance = app.engine.party_balance(&ctx, supplier.id).await.unwrap();
    assert_eq!(balance.outstanding, Decimal::ZERO);
}

#[tokio::test]
async fn mark_paid_books_the_open_remainder() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let supplier = app.supplier(&ctx).await;
    let invoice = approved_invoice(&app, &ctx, supplier.id, dec!(120)).await;
    let other = approved_invoice(&app, &ctx, supplier.id, dec!(40)).await;

    app.engine
        .payments
        .record_payment(
            &ctx,
            RecordPayment::new(supplier.id, dec!(20))
                .for_document(DocumentType::PurchaseInvoice, invoice.id),
        )
        .await
        .unwrap();

    let paid = app.engine.purchase_invoices.mark_paid(&ctx, invoice.id).await.unwrap();
    assert_eq!(paid.status, PurchaseInvoiceStatus::Paid);

    let history = app.engine.payments.list_for_party(&ctx, supplier.id).await.unwrap();
    assert_eq!(history.len(), 2);
    let remainder = history
        .iter()
        .find(|p| p.reference.as_deref() == Some(invoice.document_number.as_str()))
        .expect("payment for the remainder");
    assert_eq!(remainder.amount, dec!(100));

    // The other invoice is untouched.
    let balance = app.engine.party_balance(&ctx, supplier.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(40));
    let other = app.engine.purchase_invoices.get(&ctx, other.id).await.unwrap();
    assert_eq!(other.invoice.status, PurchaseInvoiceStatus::Approved);

    let err = app
        .engine
        .purchase_invoices
        .cancel(&ctx, invoice.id, "too late")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn overdue_refresh_counts_obligations_past_due() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(10000), 10).await;
    let product = app.product(&ctx).await;
    app.approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(2), dec!(35))])
        .await;

    let today = Utc::now().date_naive();
    let parties = &app.engine.parties;

    assert_eq!(parties.refresh_overdue(&ctx, Some(today + Duration::days(10))).await.unwrap(), 0);
    assert_eq!(parties.refresh_overdue(&ctx, Some(today + Duration::days(11))).await.unwrap(), 1);
    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.overdue, dec!(70));

    // Idempotent for the same date.
    assert_eq!(parties.refresh_overdue(&ctx, Some(today + Duration::days(11))).await.unwrap(), 0);

    app.engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, dec!(70)))
        .await
        .unwrap();
    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, Decimal::ZERO);
    assert_eq!(balance.overdue, Decimal::ZERO);
}

#[tokio::test]
async fn party_deletion_is_guarded() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let parties = &app.engine.parties;

    let unused = app.customer(&ctx, dec!(100), 30).await;
    parties.delete(&ctx, unused.id).await.unwrap();
    assert_matches!(parties.get(&ctx, unused.id).await.unwrap_err(), ServiceError::NotFound(_));

    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    app.approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(25))])
        .await;

    let err = parties.delete(&ctx, customer.id).await.unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, dec!(25)))
        .await
        .unwrap();
    let err = parties.delete(&ctx, customer.id).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn reconciliation_matches_the_obligation_ledger() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(10000), 30).await;
    let product = app.product(&ctx).await;
    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(3), dec!(10))])
        .await;
    app.engine
        .payments
        .record_payment(&ctx, RecordPayment::new(customer.id, dec!(12)))
        .await
        .unwrap();
    app.engine
        .sales_orders
        .cancel(&ctx, order.order.id, "duplicate order")
        .await
        .unwrap();

    let report = app.engine.parties.reconcile(&ctx, customer.id).await.unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.recorded, Decimal::ZERO);
    assert_eq!(report.computed, Decimal::ZERO);
}
