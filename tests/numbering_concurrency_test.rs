mod common;

use std::collections::BTreeSet;

use futures::future::join_all;
use rust_decimal_macros::dec;

use common::{tenant, TestEngine};
use docflow::numbering::format_number;
use docflow::services::sales_orders::CreateSalesOrder;
use docflow::LineInput;

#[tokio::test]
async fn concurrent_creations_get_distinct_gapless_numbers() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(100000), 30).await;
    let product = app.product(&ctx).await;

    let creations = (0..20).map(|i| {
        let input = CreateSalesOrder::new(
            customer.id,
            vec![LineInput::new(product.id, dec!(1), rust_decimal::Decimal::from(i + 1))],
        );
        app.engine.sales_orders.create(&ctx, input)
    });
    let results = join_all(creations).await;

    let numbers: BTreeSet<String> = results
        .into_iter()
        .map(|result| result.expect("creation succeeds").order.document_number)
        .collect();
    assert_eq!(numbers.len(), 20);
    let expected: BTreeSet<String> = (1..=20).map(|n| format_number("SO", n, 6)).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn document_types_have_separate_sequences() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(100000), 30).await;
    let supplier = app.supplier(&ctx).await;
    let product = app.product(&ctx).await;

    let first_so = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;
    let first_po = app
        .approved_purchase_order(&ctx, supplier.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;
    let second_so = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;

    assert_eq!(first_so.order.document_number, "SO-000001");
    assert_eq!(first_po.order.document_number, "PO-000001");
    assert_eq!(second_so.order.document_number, "SO-000002");
}

#[tokio::test]
async fn configured_width_pads_numbers() {
    let app = TestEngine::with_config(|cfg| cfg.document_number_width = 4).await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(100000), 30).await;
    let product = app.product(&ctx).await;

    let order = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;
    assert_eq!(order.order.document_number, "SO-0001");
}
