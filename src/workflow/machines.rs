use super::StatusMachine;
use crate::entities::enums::{
    DeliveryStatus, DocumentType, GoodsReceiptStatus, PurchaseInvoiceStatus, PurchaseOrderStatus,
    SalesOrderStatus,
};

impl StatusMachine for SalesOrderStatus {
    const DOCUMENT: DocumentType = DocumentType::SalesOrder;
    const INITIAL: Self = SalesOrderStatus::Draft;
    const TRANSITIONS: &'static [(Self, Self)] = {
        use SalesOrderStatus::*;
        &[
            (Draft, Pending),
            (Pending, Approved),
            (Approved, Processing),
            (Processing, Shipped),
            (Shipped, Delivered),
            (Delivered, Completed),
            (Draft, Cancelled),
            (Pending, Cancelled),
            (Approved, Cancelled),
            (Processing, Cancelled),
            (Shipped, Cancelled),
            (Delivered, Cancelled),
        ]
    };
}

impl StatusMachine for DeliveryStatus {
    const DOCUMENT: DocumentType = DocumentType::Delivery;
    const INITIAL: Self = DeliveryStatus::Prepared;
    const TRANSITIONS: &'static [(Self, Self)] = {
        use DeliveryStatus::*;
        &[
            (Prepared, InTransit),
            (InTransit, Delivered),
            (Delivered, Confirmed),
            (Prepared, Cancelled),
            (InTransit, Cancelled),
            (Delivered, Cancelled),
        ]
    };
}

impl StatusMachine for PurchaseOrderStatus {
    const DOCUMENT: DocumentType = DocumentType::PurchaseOrder;
    const INITIAL: Self = PurchaseOrderStatus::Draft;
    const TRANSITIONS: &'static [(Self, Self)] = {
        use PurchaseOrderStatus::*;
        &[
            (Draft, Submitted),
            (Submitted, Approved),
            (Approved, Closed),
            (Draft, Cancelled),
            (Submitted, Cancelled),
            (Approved, Cancelled),
        ]
    };
}

impl StatusMachine for GoodsReceiptStatus {
    const DOCUMENT: DocumentType = DocumentType::GoodsReceipt;
    const INITIAL: Self = GoodsReceiptStatus::Received;
    const TRANSITIONS: &'static [(Self, Self)] =
        &[(GoodsReceiptStatus::Received, GoodsReceiptStatus::Cancelled)];
}

impl StatusMachine for PurchaseInvoiceStatus {
    const DOCUMENT: DocumentType = DocumentType::PurchaseInvoice;
    const INITIAL: Self = PurchaseInvoiceStatus::Draft;
    const TRANSITIONS: &'static [(Self, Self)] = {
        use PurchaseInvoiceStatus::*;
        &[
            (Draft, Submitted),
            (Submitted, Approved),
            (Submitted, Rejected),
            (Approved, Paid),
            (Approved, Cancelled),
        ]
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ErrorKind, ServiceError};
    use proptest::prelude::*;
    use rstest::rstest;
    use sea_orm::Iterable;

    #[rstest]
    #[case(SalesOrderStatus::Draft, SalesOrderStatus::Pending)]
    #[case(SalesOrderStatus::Pending, SalesOrderStatus::Approved)]
    #[case(SalesOrderStatus::Delivered, SalesOrderStatus::Completed)]
    #[case(SalesOrderStatus::Shipped, SalesOrderStatus::Cancelled)]
    fn sales_order_allows(#[case] from: SalesOrderStatus, #[case] to: SalesOrderStatus) {
        assert_eq!(from.transition(to).unwrap(), to);
    }

    #[rstest]
    #[case(SalesOrderStatus::Draft, SalesOrderStatus::Approved)]
    #[case(SalesOrderStatus::Completed, SalesOrderStatus::Cancelled)]
    #[case(SalesOrderStatus::Cancelled, SalesOrderStatus::Draft)]
    #[case(SalesOrderStatus::Approved, SalesOrderStatus::Pending)]
    fn sales_order_rejects(#[case] from: SalesOrderStatus, #[case] to: SalesOrderStatus) {
        let err = from.transition(to).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn invalid_transition_names_both_states() {
        let err = PurchaseInvoiceStatus::Draft
            .transition(PurchaseInvoiceStatus::Paid)
            .unwrap_err();
        match err {
            ServiceError::InvalidTransition { document, from, to } => {
                assert_eq!(document, DocumentType::PurchaseInvoice);
                assert_eq!(from, "DRAFT");
                assert_eq!(to, "PAID");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[rstest]
    #[case(PurchaseInvoiceStatus::Submitted, PurchaseInvoiceStatus::Rejected, true)]
    #[case(PurchaseInvoiceStatus::Rejected, PurchaseInvoiceStatus::Approved, false)]
    #[case(PurchaseInvoiceStatus::Approved, PurchaseInvoiceStatus::Paid, true)]
    #[case(PurchaseInvoiceStatus::Paid, PurchaseInvoiceStatus::Cancelled, false)]
    #[case(PurchaseInvoiceStatus::Draft, PurchaseInvoiceStatus::Cancelled, false)]
    fn purchase_invoice_table(
        #[case] from: PurchaseInvoiceStatus,
        #[case] to: PurchaseInvoiceStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(from.can_transition_to(to), allowed);
    }

    #[test]
    fn terminal_states() {
        assert!(SalesOrderStatus::Completed.is_terminal());
        assert!(SalesOrderStatus::Cancelled.is_terminal());
        assert!(DeliveryStatus::Confirmed.is_terminal());
        assert!(PurchaseOrderStatus::Closed.is_terminal());
        assert!(GoodsReceiptStatus::Cancelled.is_terminal());
        assert!(PurchaseInvoiceStatus::Rejected.is_terminal());
        assert!(PurchaseInvoiceStatus::Paid.is_terminal());
        assert!(!DeliveryStatus::Delivered.is_terminal());
    }

    #[test]
    fn parse_accepts_stored_spelling() {
        assert_eq!(
            DeliveryStatus::parse("IN_TRANSIT").unwrap(),
            DeliveryStatus::InTransit
        );
        let err = DeliveryStatus::parse("LOST").unwrap_err();
        assert!(matches!(err, ServiceError::InvalidField { ref field, .. } if field == "target_state"));
    }

    fn never_self_loops<S: StatusMachine>() {
        for &(from, to) in S::TRANSITIONS {
            assert!(from != to, "{} lists a self transition", S::DOCUMENT);
        }
    }

    #[test]
    fn no_table_contains_self_transitions() {
        never_self_loops::<SalesOrderStatus>();
        never_self_loops::<DeliveryStatus>();
        never_self_loops::<PurchaseOrderStatus>();
        never_self_loops::<GoodsReceiptStatus>();
        never_self_loops::<PurchaseInvoiceStatus>();
    }

    proptest! {
        #[test]
        fn sales_order_transition_matches_table(
            from in proptest::sample::select(SalesOrderStatus::iter().collect::<Vec<_>>()),
            to in proptest::sample::select(SalesOrderStatus::iter().collect::<Vec<_>>()),
        ) {
            let listed = SalesOrderStatus::TRANSITIONS.contains(&(from, to));
            prop_assert_eq!(from.transition(to).is_ok(), listed);
            prop_assert_eq!(from.allowed_targets().contains(&to), listed);
        }

        #[test]
        fn delivery_transition_matches_table(
            from in proptest::sample::select(DeliveryStatus::iter().collect::<Vec<_>>()),
            to in proptest::sample::select(DeliveryStatus::iter().collect::<Vec<_>>()),
        ) {
            let listed = DeliveryStatus::TRANSITIONS.contains(&(from, to));
            prop_assert_eq!(from.transition(to).is_ok(), listed);
        }
    }
}
