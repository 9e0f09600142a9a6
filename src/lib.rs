//! docflow
//!
//! Multi-tenant document workflow engine: sales orders, deliveries, purchase
//! orders, goods receipts and purchase invoices with per-tenant numbering,
//! explicit lifecycles, quantity matching and party balances.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod audit;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod ledger;
pub mod migrator;
pub mod numbering;
pub mod services;
pub mod tenancy;
pub mod totals;
pub mod workflow;

pub use errors::{ErrorKind, ServiceError};
pub use services::documents::{CreateDocument, Document, DocumentEngine, DocumentRef};
pub use services::{LineInput, ServiceDeps, TransitionPayload};
pub use tenancy::TenantContext;
