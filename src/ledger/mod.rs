//! Derived quantities and balances kept consistent across linked documents.

pub mod balance;
pub mod quantity;

pub use balance::{
    available_credit, check_credit, CreditCheck, PartyBalance, ReconciliationReport,
    SettlementScope,
};
pub use quantity::{QuantityDelta, QuantityPolicy, QuantityStatusReport};
