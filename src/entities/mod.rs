//! Database entities. Every table carries `tenant_id`; business tables also
//! carry `company_id`.

pub mod enums;

// Master data
pub mod document_sequence;
pub mod party;
pub mod product;
pub mod tenant_setting;

// Sales
pub mod delivery;
pub mod delivery_line;
pub mod sales_order;
pub mod sales_order_line;

// Procurement
pub mod goods_receipt;
pub mod goods_receipt_line;
pub mod purchase_invoice;
pub mod purchase_invoice_line;
pub mod purchase_order;
pub mod purchase_order_line;

// Balances
pub mod party_obligation;
pub mod payment;
pub mod payment_allocation;

pub mod audit_log;
