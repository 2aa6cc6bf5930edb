//! Business logic services.
//!
//! # Services
//!
//! - `order_sync` - Mirrors ShipStation orders, customers, products and tags
//! - `reconcile` - Resolves personalizations and writes the print queue

pub mod order_sync;
pub mod reconcile;

pub use order_sync::{OrderSyncService, SyncError, SyncMode, SyncOptions, SyncSummary};
pub use reconcile::{Orchestrator, ProcessOptions, ReconcileError, RunSummary};
