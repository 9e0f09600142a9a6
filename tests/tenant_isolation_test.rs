mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use common::{sibling_company, tenant, TestEngine};
use docflow::entities::enums::SalesOrderStatus;
use docflow::services::parties::UpdateParty;
use docflow::services::sales_orders::CreateSalesOrder;
use docflow::{LineInput, ServiceError, TenantContext};

#[tokio::test]
async fn context_requires_every_identifier() {
    let err = TenantContext::new(Uuid::nil(), Uuid::new_v4(), Uuid::new_v4()).unwrap_err();
    assert_matches!(err, ServiceError::TenantContextMissing(_));

    let err = TenantContext::from_parts(Some(Uuid::new_v4()), None, Some(Uuid::new_v4())).unwrap_err();
    assert_matches!(err, ServiceError::TenantContextMissing(_));
}

#[tokio::test]
async fn documents_of_another_tenant_are_not_found() {
    let app = TestEngine::new().await;
    let owner = tenant();
    let intruder = tenant();

    let customer = app.customer(&owner, dec!(1000), 30).await;
    let product = app.product(&owner).await;
    let order = app
        .draft_sales_order(&owner, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(10))])
        .await;

    let err = app.engine.sales_orders.get(&intruder, order.order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app.engine.sales_orders.submit(&intruder, order.order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app.engine.sales_orders.delete(&intruder, order.order.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    // Untouched for the owner.
    let reloaded = app.engine.sales_orders.get(&owner, order.order.id).await.unwrap();
    assert_eq!(reloaded.order.status, SalesOrderStatus::Draft);
    assert_eq!(reloaded.order.version, order.order.version);
}

#[tokio::test]
async fn parties_are_scoped_to_the_company() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let other_company = sibling_company(&ctx);

    let customer = app.customer(&ctx, dec!(500), 14).await;

    let err = app.engine.parties.get(&other_company, customer.id).await.unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .engine
        .parties
        .update(
            &other_company,
            customer.id,
            UpdateParty {
                credit_limit: Some(dec!(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    assert!(app.engine.parties.list(&other_company).await.unwrap().is_empty());
    assert_eq!(app.engine.parties.list(&ctx).await.unwrap().len(), 1);
}

#[tokio::test]
async fn documents_cannot_reference_another_tenants_records() {
    let app = TestEngine::new().await;
    let owner = tenant();
    let intruder = tenant();

    let foreign_customer = app.customer(&owner, dec!(1000), 30).await;
    let foreign_product = app.product(&owner).await;
    let own_customer = app.customer(&intruder, dec!(1000), 30).await;

    let err = app
        .engine
        .sales_orders
        .create(
            &intruder,
            CreateSalesOrder::new(
                foreign_customer.id,
                vec![LineInput::new(foreign_product.id, dec!(1), dec!(1))],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));

    let err = app
        .engine
        .sales_orders
        .create(
            &intruder,
            CreateSalesOrder::new(
                own_customer.id,
                vec![LineInput::new(foreign_product.id, dec!(1), dec!(1))],
            ),
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn numbering_is_independent_per_tenant() {
    let app = TestEngine::new().await;
    let first = tenant();
    let second = tenant();

    for ctx in [&first, &second] {
        let customer = app.customer(ctx, dec!(1000), 30).await;
        let product = app.product(ctx).await;
        let order = app
            .draft_sales_order(ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(5))])
            .await;
        assert_eq!(order.order.document_number, "SO-000001");
    }
}
