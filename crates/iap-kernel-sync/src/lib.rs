//! # IAP Kernel Sync
//!
//! Keeps the local entitlement store converged with the remote ledger.
//!
//! ## Overview
//!
//! The remote store is reached through two service traits: [`Ledger`]
//! (entitlement snapshots, live updates, purchases, finishing) and
//! [`Catalog`] (product metadata). On top of them:
//!
//! - [`Reconciler`] pulls the current entitlement snapshot, runs every record
//!   through the verification gate and merges the accepted ones into the
//!   [`EntitlementStore`](iap_kernel_store::EntitlementStore).
//! - [`TransactionListener`] subscribes to the ledger's live update stream
//!   and runs a reconcile pass for every event.
//!
//! ## Key Properties
//!
//! - **Idempotent**: replaying a snapshot changes nothing
//! - **Commutative**: concurrent passes converge regardless of interleaving
//! - **Full replay**: update payloads are ignored; truth is re-derived from
//!   the snapshot, so out-of-order or duplicate events are harmless
//!
//! ## Event Flow
//!
//! ```text
//! Ledger                  Listener               Reconciler         Store
//!   |--- update ----------->|                        |                 |
//!   |                       |--- reconcile() ------->|                 |
//!   |<-- current_entitlements() ---------------------|                 |
//!   |--- [VerificationResult] ---------------------->|                 |
//!   |                       |                        |-- verify ------>|
//!   |                       |                        |-- reconcile --->|
//! ```

pub mod catalog;
pub mod error;
pub mod ledger;
pub mod listener;
pub mod memory;
pub mod reconciler;

pub use catalog::Catalog;
pub use error::{LedgerError, Result};
pub use ledger::{Ledger, PurchaseResult, UpdateStream};
pub use listener::{ListenerConfig, ListenerHandle, ListenerStats, TransactionListener};
pub use memory::{MemoryCatalog, MemoryLedger, PurchaseScript};
pub use reconciler::{ReconcileReport, Reconciler};
