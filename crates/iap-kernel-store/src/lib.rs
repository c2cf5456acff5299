//! # IAP Kernel Store
//!
//! The entitlement store: the single shared set of product identifiers the
//! user currently owns.
//!
//! ## Overview
//!
//! [`EntitlementStore`] is mutated only through [`EntitlementStore::reconcile`],
//! which merges a batch of verified transactions into the set. Readers get
//! copies via [`EntitlementStore::snapshot`] or point queries via
//! [`EntitlementStore::contains`].
//!
//! ## Usage
//!
//! ```rust
//! use iap_kernel_core::{ProductId, TransactionBuilder};
//! use iap_kernel_store::EntitlementStore;
//!
//! let store = EntitlementStore::new();
//! let tx = TransactionBuilder::new(1, "premium").purchased_at(1_000).build();
//! store.reconcile(&[tx]);
//! assert!(store.contains(&ProductId::from("premium")));
//! ```
//!
//! ## Design Notes
//!
//! - **Merge, never clear**: a reconcile pass only touches the products its
//!   records mention.
//! - **Last writer wins per product**: each product remembers the version of
//!   the record that decided its state; older records are ignored. Passes are
//!   therefore idempotent and commutative.
//! - **Atomic batches**: a whole batch is applied under one write lock, so no
//!   reader ever sees half a pass.

pub mod entitlements;

pub use entitlements::{ApplyResult, EntitlementStore, ReconcileSummary};
