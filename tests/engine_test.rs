mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;

use common::{tenant, TestEngine};
use docflow::entities::enums::DocumentType;
use docflow::services::deliveries::CreateDelivery;
use docflow::services::goods_receipts::{CreateGoodsReceipt, ReceiptLineInput};
use docflow::services::purchase_invoices::{CreatePurchaseInvoice, InvoiceLineInput};
use docflow::services::purchase_orders::CreatePurchaseOrder;
use docflow::services::sales_orders::CreateSalesOrder;
use docflow::{
    CreateDocument, Document, DocumentRef, LineInput, ServiceError, TransitionPayload,
};

#[tokio::test]
async fn sales_documents_run_through_the_generic_surface() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(5000), 30).await;
    let product = app.product(&ctx).await;
    let engine = &app.engine;

    let order = engine
        .create_document(
            &ctx,
            CreateDocument::SalesOrder(CreateSalesOrder::new(
                customer.id,
                vec![LineInput::new(product.id, dec!(5), dec!(20))],
            )),
        )
        .await
        .unwrap();
    assert_eq!(order.document_type(), DocumentType::SalesOrder);
    assert_eq!(order.document_number(), "SO-000001");
    assert_eq!(order.status(), "DRAFT");

    let order_ref = order.reference();
    for target in ["PENDING", "APPROVED"] {
        let moved = engine
            .transition_document(&ctx, order_ref, target, TransitionPayload::default())
            .await
            .unwrap();
        assert_eq!(moved.status(), target);
    }

    let delivery = engine
        .create_document(
            &ctx,
            CreateDocument::Delivery(CreateDelivery::remaining_of(order_ref.id)),
        )
        .await
        .unwrap();
    assert_eq!(delivery.document_number(), "DN-000001");
    assert_eq!(delivery.status(), "PREPARED");

    let shipped = engine
        .transition_document(&ctx, delivery.reference(), "IN_TRANSIT", TransitionPayload::default())
        .await
        .unwrap();
    assert_eq!(shipped.status(), "IN_TRANSIT");
    assert!(shipped.version() > delivery.version());

    let fetched = engine.get_document(&ctx, order_ref).await.unwrap();
    assert_matches!(fetched, Document::SalesOrder(ref detail) if detail.lines[0].delivered_qty == dec!(5));
}

#[tokio::test]
async fn purchase_documents_run_through_the_generic_surface() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let supplier = app.supplier(&ctx).await;
    let product = app.product(&ctx).await;
    let engine = &app.engine;

    let order = engine
        .create_document(
            &ctx,
            CreateDocument::PurchaseOrder(CreatePurchaseOrder::new(
                supplier.id,
                vec![LineInput::new(product.id, dec!(8), dec!(3))],
            )),
        )
        .await
        .unwrap();
    assert_eq!(order.document_number(), "PO-000001");
    for target in ["SUBMITTED", "APPROVED"] {
        engine
            .transition_document(&ctx, order.reference(), target, TransitionPayload::default())
            .await
            .unwrap();
    }
    let Document::PurchaseOrder(detail) = engine.get_document(&ctx, order.reference()).await.unwrap() else {
        panic!("expected a purchase order");
    };
    let po_line = detail.lines[0].clone();

    let receipt = engine
        .create_document(
            &ctx,
            CreateDocument::GoodsReceipt(CreateGoodsReceipt::new(
                order.id(),
                vec![ReceiptLineInput::new(po_line.id, dec!(8))],
            )),
        )
        .await
        .unwrap();
    assert_eq!(receipt.document_number(), "GRN-000001");
    assert_eq!(receipt.status(), "RECEIVED");

    let invoice = engine
        .create_document(
            &ctx,
            CreateDocument::PurchaseInvoice(
                CreatePurchaseInvoice::new(
                    supplier.id,
                    vec![InvoiceLineInput::matched(
                        po_line.id,
                        LineInput::new(product.id, dec!(8), dec!(3)),
                    )],
                )
                .against_receipt(receipt.id()),
            ),
        )
        .await
        .unwrap();
    assert_eq!(invoice.document_number(), "PI-000001");

    for target in ["SUBMITTED", "APPROVED", "PAID"] {
        let moved = engine
            .transition_document(&ctx, invoice.reference(), target, TransitionPayload::default())
            .await
            .unwrap();
        assert_eq!(moved.status(), target);
    }

    let status = engine.effective_quantity_status(&ctx, order.id()).await.unwrap();
    assert_eq!(status.lines[0].received, dec!(8));
    assert_eq!(status.lines[0].invoiced, dec!(8));
    let balance = engine.party_balance(&ctx, supplier.id).await.unwrap();
    assert_eq!(balance.outstanding, dec!(0));
}

#[tokio::test]
async fn unknown_target_state_is_an_invalid_field() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(5000), 30).await;
    let product = app.product(&ctx).await;
    let order = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;
    let order_ref = DocumentRef::new(DocumentType::SalesOrder, order.order.id);

    for target in ["SHIPPED_TWICE", "pending", ""] {
        let err = app
            .engine
            .transition_document(&ctx, order_ref, target, TransitionPayload::default())
            .await
            .unwrap_err();
        assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "target_state");
    }

    let err = app
        .engine
        .transition_document(&ctx, order_ref, "CANCELLED", TransitionPayload::default())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidField { ref field, .. } if field == "reason");

    let cancelled = app
        .engine
        .transition_document(
            &ctx,
            order_ref,
            "CANCELLED",
            TransitionPayload::with_reason("entered twice"),
        )
        .await
        .unwrap();
    assert_eq!(cancelled.status(), "CANCELLED");
}

#[tokio::test]
async fn reference_with_the_wrong_type_is_not_found() {
    let app = TestEngine::new().await;
    let ctx = tenant();
    let customer = app.customer(&ctx, dec!(5000), 30).await;
    let product = app.product(&ctx).await;
    let order = app
        .draft_sales_order(&ctx, customer.id, vec![LineInput::new(product.id, dec!(1), dec!(1))])
        .await;

    let err = app
        .engine
        .get_document(&ctx, DocumentRef::new(DocumentType::PurchaseOrder, order.order.id))
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}
