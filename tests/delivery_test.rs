mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use common::{tenant, TestEngine};
use docflow::entities::enums::{DeliveryStatus, SalesOrderStatus};
use docflow::services::deliveries::{CreateDelivery, DeliveryLineInput};
use docflow::services::sales_orders::SalesOrderDetail;
use docflow::{LineInput, ServiceError, TenantContext};

async fn order_with_two_lines(app: &TestEngine, ctx: &TenantContext) -> SalesOrderDetail {
    let customer = app.customer(ctx, dec!(100000), 30).await;
    let bolts = app.product(ctx).await;
    let nuts = app.product(ctx).await;
    app.approved_sales_order(
        ctx,
        customer.id,
        vec![
            LineInput::new(bolts.id, dec!(10), dec!(2)),
            LineInput::new(nuts.id, dec!(4), dec!(1)),
        ],
    )
    .await
}

#[tokio::test]
async fn partial_deliveries_accumulate_on_order_lines() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let bolts = &order.lines[0];

    let first = app
        .engine
        .deliveries
        .create(
            &ctx,
            CreateDelivery::with_lines(order.order.id, vec![DeliveryLineInput::new(bolts.id, dec!(6))]),
        )
        .await
        .unwrap();
    assert_eq!(first.delivery.document_number, "DN-000001");
    assert_eq!(first.delivery.status, DeliveryStatus::Prepared);
    assert_eq!(first.delivery.customer_id, order.order.customer_id);
    assert_eq!(first.lines.len(), 1);
    assert_eq!(first.lines[0].product_id, bolts.product_id);

    let reloaded = app.engine.sales_orders.get(&ctx, order.order.id).await.unwrap();
    assert_eq!(reloaded.lines[0].delivered_qty, dec!(6));
    assert_eq!(reloaded.lines[1].delivered_qty, dec!(0));

    let err = app
        .engine
        .deliveries
        .create(
            &ctx,
            CreateDelivery::with_lines(order.order.id, vec![DeliveryLineInput::new(bolts.id, dec!(5))]),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvariantViolation(_));

    let rest = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();
    assert_eq!(rest.delivery.document_number, "DN-000002");
    let quantities: Vec<_> = rest.lines.iter().map(|line| line.quantity).collect();
    assert_eq!(quantities.len(), 2);
    assert!(quantities.contains(&dec!(4)));

    let err = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn delivery_requires_an_approved_order() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let draft = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;

    let err = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(draft.order.id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let reloaded = app.engine.sales_orders.get(&ctx, draft.order.id).await.unwrap();
    assert_eq!(reloaded.lines[0].delivered_qty, dec!(0));
}

#[tokio::test]
async fn lines_of_another_order_are_rejected_without_side_effects() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let other = order_with_two_lines(&app, &ctx).await;

    let err = app
        .engine
        .deliveries
        .create(
            &ctx,
            CreateDelivery::with_lines(
                order.order.id,
                vec![
                    DeliveryLineInput::new(order.lines[0].id, dec!(1)),
                    DeliveryLineInput::new(other.lines[0].id, dec!(1)),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let reloaded = app.engine.sales_orders.get(&ctx, order.order.id).await.unwrap();
    assert!(reloaded.lines.iter().all(|line| line.delivered_qty.is_zero()));
    assert!(app
        .engine
        .deliveries
        .list_for_order(&ctx, order.order.id)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn non_positive_quantities_are_invalid() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;

    let err = app
        .engine
        .deliveries
        .create(
            &ctx,
            CreateDelivery::with_lines(
                order.order.id,
                vec![DeliveryLineInput::new(order.lines[0].id, dec!(0))],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "quantity");
}

#[tokio::test]
async fn delivery_moves_through_its_lifecycle() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let detail = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();
    let deliveries = &app.engine.deliveries;
    let id = detail.delivery.id;

    let err = deliveries.confirm(&ctx, id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::InvalidTransition { ref from, ref to, .. } if from == "PREPARED" && to == "CONFIRMED"
    );

    let shipped = deliveries.dispatch(&ctx, id).await.unwrap();
    assert_eq!(shipped.status, DeliveryStatus::InTransit);
    assert!(shipped.shipped_at.is_some());

    let delivered = deliveries.mark_delivered(&ctx, id).await.unwrap();
    assert_eq!(delivered.status, DeliveryStatus::Delivered);
    assert!(delivered.delivered_at.is_some());

    let confirmed = deliveries.confirm(&ctx, id).await.unwrap();
    assert_eq!(confirmed.status, DeliveryStatus::Confirmed);
    assert_eq!(confirmed.confirmed_by, Some(ctx.user_id()));

    let err = deliveries.cancel(&ctx, id, "lost").await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidTransition { .. });
}

#[tokio::test]
async fn cancelling_a_delivery_gives_quantities_back() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let detail = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();

    let err = app
        .engine
        .deliveries
        .cancel(&ctx, detail.delivery.id, "")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "reason");

    let cancelled = app
        .engine
        .deliveries
        .cancel(&ctx, detail.delivery.id, "truck broke down")
        .await
        .unwrap();
    assert_eq!(cancelled.status, DeliveryStatus::Cancelled);
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("truck broke down"));

    let reloaded = app.engine.sales_orders.get(&ctx, order.order.id).await.unwrap();
    assert!(reloaded.lines.iter().all(|line| line.delivered_qty.is_zero()));

    let again = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();
    assert_eq!(again.lines.len(), 2);
}

#[tokio::test]
async fn order_cancellation_is_blocked_by_goods_in_transit() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let detail = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();
    app.engine.deliveries.dispatch(&ctx, detail.delivery.id).await.unwrap();

    let err = app
        .engine
        .sales_orders
        .cancel(&ctx, order.order.id, "changed mind")
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvariantViolation(_));

    let reloaded = app.engine.sales_orders.get(&ctx, order.order.id).await.unwrap();
    assert_eq!(reloaded.order.status, SalesOrderStatus::Approved);
}

#[tokio::test]
async fn order_cancellation_cancels_prepared_deliveries() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let order = order_with_two_lines(&app, &ctx).await;
    let detail = app
        .engine
        .deliveries
        .create(&ctx, CreateDelivery::remaining_of(order.order.id))
        .await
        .unwrap();

    app.engine
        .sales_orders
        .cancel(&ctx, order.order.id, "changed mind")
        .await
        .unwrap();

    let delivery = app.engine.deliveries.get(&ctx, detail.delivery.id).await.unwrap();
    assert_eq!(delivery.delivery.status, DeliveryStatus::Cancelled);
    assert_eq!(delivery.delivery.cancellation_reason.as_deref(), Some("changed mind"));

    let reloaded = app.engine.sales_orders.get(&ctx, order.order.id).await.unwrap();
    assert!(reloaded.lines.iter().all(|line| line.delivered_qty.is_zero()));
}
