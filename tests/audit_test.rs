mod common;

use rust_decimal_macros::dec;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use common::{tenant, TestEngine};
use docflow::audit::{AuditAction, AuditDispatcher, AuditRecord, AuditSink, DatabaseAuditSink};
use docflow::entities::audit_log;
use docflow::LineInput;

#[tokio::test]
async fn committed_operations_are_audited_in_order() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    // Party and product creation.
    let already = app.audit_records(2).await.len();
    assert_eq!(already, 2);

    let order = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;
    // Fails and must leave no trace.
    app.engine.sales_orders.ship(&ctx, order.order.id).await.unwrap_err();
    app.engine.sales_orders.submit(&ctx, order.order.id).await.unwrap();

    let records = app.audit_records(already + 2).await;
    let records = &records[already..];
    assert_eq!(records.len(), 2);

    let created = &records[0];
    assert_eq!(created.action, AuditAction::Create);
    assert_eq!(created.entity_type, "SALES_ORDER");
    assert_eq!(created.entity_id, order.order.id);
    assert_eq!(created.tenant_id, ctx.tenant_id());
    assert_eq!(created.actor, ctx.user_id());
    let after = created.after.as_ref().expect("snapshot");
    assert_eq!(after["order"]["document_number"], "SO-000001");

    let submitted = &records[1];
    assert_eq!(submitted.action, AuditAction::Transition);
    assert_eq!(submitted.before, Some(serde_json::json!({ "status": "DRAFT" })));
    assert_eq!(submitted.after, Some(serde_json::json!({ "status": "PENDING" })));
}

#[tokio::test]
async fn cancellation_audits_every_document_it_touches() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(1000), 30).await;
    let product = app.product(&ctx).await;
    let order = app
        .approved_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(2), dec!(10))])
        .await;
    let delivery = app
        .engine
        .deliveries
        .create(
            &ctx,
            docflow::services::deliveries::CreateDelivery::remaining_of(order.order.id),
        )
        .await
        .unwrap();
    // Party, product, order create, submit, approve and delivery create.
    let before = app.audit_records(6).await.len();
    assert_eq!(before, 6);

    app.engine
        .sales_orders
        .cancel(&ctx, order.order.id, "out of stock")
        .await
        .unwrap();

    let records = app.audit_records(before + 2).await;
    let touched: Vec<_> = records[before..]
        .iter()
        .map(|r| (r.entity_type.as_str(), r.entity_id))
        .collect();
    assert!(touched.contains(&("DELIVERY", delivery.delivery.id)));
    assert!(touched.contains(&("SALES_ORDER", order.order.id)));
}

#[tokio::test]
async fn database_sink_persists_records_in_scope() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let sink = DatabaseAuditSink::new(app.db.clone());

    let entity_id = Uuid::new_v4();
    let record = AuditRecord::transition(&ctx, "DELIVERY", entity_id, "PREPARED", "IN_TRANSIT");
    sink.record(&record).await.unwrap();

    let rows = audit_log::Entity::find()
        .filter(audit_log::Column::EntityId.eq(entity_id))
        .all(app.db.as_ref())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].tenant_id, ctx.tenant_id());
    assert_eq!(rows[0].company_id, ctx.company_id());
    assert_eq!(rows[0].action, "TRANSITION");
    assert_eq!(rows[0].after, Some(serde_json::json!({ "status": "IN_TRANSIT" })));
}

#[tokio::test]
async fn disabled_dispatcher_drops_records() {
    let ctx = tenant();
    let dispatcher = AuditDispatcher::disabled();
    dispatcher.dispatch(AuditRecord::new(&ctx, "PARTY", Uuid::new_v4(), AuditAction::Create));
}
