mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};

use common::{tenant, TestEngine};
use docflow::entities::enums::{
    CreditPolicy, DocumentType, InvoiceQuantityPolicy, ObligationDirection, ObligationStatus,
    SalesOrderStatus,
};
use docflow::entities::party_obligation;
use docflow::services::sales_orders::{CreateSalesOrder, ReplaceSalesOrderLines};
use docflow::services::settings::UpdateSettings;
use docflow::{LineInput, ServiceError, TenantContext, TransitionPayload};

async fn enforce_credit(app: &TestEngine, ctx: &TenantContext) {
    app.engine
        .settings
        .update(
            ctx,
            UpdateSettings {
                invoice_quantity_policy: InvoiceQuantityPolicy::Ordered,
                invoice_tolerance_percent: Decimal::ZERO,
                receipt_tolerance_percent: Decimal::ZERO,
                credit_policy: CreditPolicy::Enforce,
                expected_version: None,
            },
        )
        .await
        .expect("settings update");
}

#[tokio::test]
async fn order_runs_its_full_lifecycle() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(10000), 30).await;
    let widget = app.product(&ctx).await;
    let gadget = app.product(&ctx).await;

    let mut input = CreateSalesOrder::new(
        customer.id,
        vec![
            LineInput::new(widget.id, dec!(2), dec!(50))
                .with_discount(dec!(10))
                .with_tax_rate(dec!(10)),
            LineInput::new(gadget.id, dec!(1), dec!(20)),
        ],
    );
    input.shipping_amount = dec!(5);

    let created = app.engine.sales_orders.create(&ctx, input).await.unwrap();
    let order = &created.order;
    assert_eq!(order.status, SalesOrderStatus::Draft);
    assert_eq!(order.document_number, "SO-000001");
    assert_eq!(order.subtotal, dec!(120));
    assert_eq!(order.discount_total, dec!(10));
    assert_eq!(order.tax_total, dec!(9));
    assert_eq!(order.grand_total, dec!(124));
    assert_eq!(created.lines.len(), 2);
    assert_eq!(created.lines[0].line_total, dec!(99));

    let orders = &app.engine.sales_orders;
    let id = order.id;
    assert_eq!(orders.submit(&ctx, id).await.unwrap().status, SalesOrderStatus::Pending);
    let approved = orders.approve(&ctx, id).await.unwrap();
    assert_eq!(approved.status, SalesOrderStatus::Approved);
    assert_eq!(approved.approved_by, Some(ctx.user_id()));

    assert_eq!(orders.start_processing(&ctx, id).await.unwrap().status, SalesOrderStatus::Processing);
    assert_eq!(orders.ship(&ctx, id).await.unwrap().status, SalesOrderStatus::Shipped);
    assert_eq!(orders.deliver(&ctx, id).await.unwrap().status, SalesOrderStatus::Delivered);
    let completed = orders.complete(&ctx, id).await.unwrap();
    assert_eq!(completed.status, SalesOrderStatus::Completed);
    assert!(completed.version > order.version);

    let err = orders.cancel(&ctx, id, "too late").await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { document: DocumentType::SalesOrder, ref from, ref to }
            if from == "COMPLETED" && to == "CANCELLED"
    );
}

#[tokio::test]
async fn approval_opens_a_receivable_due_after_payment_terms() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;

    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(3), dec!(100))])
        .await;

    let obligations = party_obligation::Entity::find()
        .filter(party_obligation::Column::DocumentId.eq(order.order.id))
        .all(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(obligations.len(), 1);
    let receivable = &obligations[0];
    assert_eq!(receivable.direction, ObligationDirection::Receivable);
    assert_eq!(receivable.document_type, DocumentType::SalesOrder);
    assert_eq!(receivable.amount, dec!(300));
    assert_eq!(receivable.status, ObligationStatus::Open);
    assert_eq!(receivable.due_date, Utc::now().date_naive() + Duration::days(30));

    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(300));
    assert_eq!(balance.overdue, Decimal::ZERO);
    assert_eq!(balance.available_credit, dec!(700));
}

#[tokio::test]
async fn disallowed_transition_leaves_order_unchanged() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;

    let err = app
        .engine
        .sales_orders
        .transition(&ctx, draft.order.id, SalesOrderStatus::Shipped, TransitionPayload::default())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref from, ref to, .. } if from == "DRAFT" && to == "SHIPPED"
    );

    let err = app
        .engine
        .sales_orders
        .transition(&ctx, draft.order.id, SalesOrderStatus::Draft, TransitionPayload::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });

    let reloaded = app.engine.sales_orders.get(&ctx, draft.order.id).await.unwrap();
    assert_eq!(reloaded.order.status, SalesOrderStatus::Draft);
    assert_eq!(reloaded.order.version, draft.order.version);
}

#[tokio::test]
async fn only_drafts_can_be_edited_or_deleted() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;
    let orders = &app.engine.sales_orders;

    let edited = orders
        .replace_lines(
            &ctx,
            draft.order.id,
            ReplaceSalesOrderLines {
                lines: vec![LineInput::new(product.id, dec!(4), dec!(10))],
                shipping_amount: Some(dec!(2.50)),
                expected_version: Some(draft.order.version),
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.lines.len(), 1);
    assert_eq!(edited.order.subtotal, dec!(40));
    assert_eq!(edited.order.grand_total, dec!(42.50));

    orders.submit(&ctx, draft.order.id).await.unwrap();

    let err = orders
        .replace_lines(
            &ctx,
            draft.order.id,
            ReplaceSalesOrderLines {
                lines: vec![LineInput::new(product.id, dec!(1), dec!(1))],
                shipping_amount: None,
                expected_version: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref from, ref to, .. } if from == "PENDING" && to == "EDITED"
    );

    let err = orders.delete(&ctx, draft.order.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref to, .. } if to == "DELETED"
    );
}

#[tokio::test]
async fn draft_can_be_deleted() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;

    app.engine.sales_orders.delete(&ctx, draft.order.id).await.unwrap();
    let err = app.engine.sales_orders.get(&ctx, draft.order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn enforced_credit_limit_blocks_approval() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    enforce_credit(&app, &ctx).await;
    let customer = app.customer(&ctx, dec!(100), 30).await;
    let product = app.product(&ctx).await;

    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(3), dec!(50))])
        .await;
    app.engine.sales_orders.submit(&ctx, draft.order.id).await.unwrap();

    let err = app.engine.sales_orders.approve(&ctx, draft.order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::CreditLimitExceeded(_));

    let reloaded = app.engine.sales_orders.get(&ctx, draft.order.id).await.unwrap();
    assert_eq!(reloaded.order.status, SalesOrderStatus::Pending);
    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, Decimal::ZERO);
}

#[tokio::test]
async fn order_exactly_at_the_limit_is_approved_under_enforcement() {
    let app = TestEngine::with_config(|cfg| cfg.default_credit_policy = CreditPolicy::Enforce).await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(100), 30).await;
    let product = app.product(&ctx).await;

    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(2), dec!(50))])
        .await;
    assert_eq!(order.order.status, SalesOrderStatus::Approved);

    let check = app
        .engine
        .parties
        .check_credit(&ctx, customer.id, dec!(0.01))
        .await
        .unwrap();
    assert!(check.exceeded);
    assert_eq!(check.available_credit, Decimal::ZERO);
}

#[tokio::test]
async fn advisory_policy_approves_over_the_limit() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(100), 30).await;
    let product = app.product(&ctx).await;

    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(3), dec!(50))])
        .await;
    assert_eq!(order.order.status, SalesOrderStatus::Approved);

    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(150));
    assert_eq!(balance.available_credit, Decimal::ZERO);
}

#[tokio::test]
async fn cancellation_needs_a_reason_and_voids_the_receivable() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(2), dec!(40))])
        .await;
    let orders = &app.engine.sales_orders;

    let err = orders.cancel(&ctx, order.order.id, "   ").await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "reason");
    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(80));

    let cancelled = orders
        .cancel(&ctx, order.order.id, "customer withdrew")
        .await
        .unwrap();
    assert_eq!(cancelled.status, SalesOrderStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("customer withdrew"));
    assert_eq!(cancelled.cancelled_by, Some(ctx.user_id()));

    let balance = app.engine.party_balance(&ctx, customer.id).await.unwrap();
    assert_eq!(balance.outstanding, Decimal::ZERO);

    let obligation = party_obligation::Entity::find()
        .filter(party_obligation::Column::DocumentId.eq(order.order.id))
        .one(app.db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(obligation.status, ObligationStatus::Void);
}

#[tokio::test]
async fn stale_expected_version_is_a_conflict() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;
    let stale = draft.order.version;
    app.engine.sales_orders.submit(&ctx, draft.order.id).await.unwrap();

    let err = app
        .engine
        .sales_orders
        .transition(
            &ctx,
            draft.order.id,
            SalesOrderStatus::Approved,
            TransitionPayload {
                reason: None,
                expected_version: Some(stale),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn inactive_products_and_wrong_party_roles_are_rejected() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let supplier = app.supplier(&ctx).await;
    let product = app.product(&ctx).await;

    let err = app
        .engine
        .sales_orders
        .create(
            &ctx,
            CreateSalesOrder::new(supplier.id, vec![LineInput::new(product.id, dec!(1), dec!(1))]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    app.engine.catalog.deactivate_product(&ctx, product.id).await.unwrap();
    let err = app
        .engine
        .sales_orders
        .create(
            &ctx,
            CreateSalesOrder::new(customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .engine
        .sales_orders
        .create(&ctx, CreateSalesOrder::new(customer.id, Vec::new()))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "lines");
}

#[tokio::test]
async fn lines_beyond_storable_amounts_are_invalid_fields() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;

    for (quantity, unit_price, expected) in [
        (Decimal::MAX, dec!(2), "quantity"),
        (dec!(2), Decimal::MAX, "unit_price"),
        (dec!(1000000), dec!(1000000), "quantity"),
    ] {
        let err = app
            .engine
            .sales_orders
            .create(
                &ctx,
                CreateSalesOrder::new(
                    customer.id,
                    vec![LineInput::new(product.id, quantity, unit_price)],
                ),
            )
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == expected);
    }

    // Nothing was persisted, so numbering starts from the beginning.
    let order = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;
    assert_eq!(order.order.document_number, "SO-000001");
}
