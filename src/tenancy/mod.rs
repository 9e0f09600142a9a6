//! Tenant context and the tenant isolation gateway.
//!
//! Every read and write in the engine goes through a [`TenantGateway`] built
//! from an immutable [`TenantContext`]. Rows belonging to another tenant or
//! company are reported as not found.

mod context;
mod gateway;

pub use context::TenantContext;
pub use gateway::{TenantGateway, TenantScoped, TxGateway};
