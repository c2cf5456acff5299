//! # IAP Kernel Testkit
//!
//! Testing utilities for the IAP Kernel.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a seeded in-memory ledger and catalog wired into a kernel
//! - **Generators**: Proptest strategies for transaction histories
//!
//! ## Test Fixtures
//!
//! ```rust
//! use iap_kernel_testkit::fixtures::TestFixture;
//!
//! let fixture = TestFixture::new();
//! fixture.ledger.grant("premium", iap_kernel_core::ProductKind::NonConsumable);
//! assert_eq!(fixture.catalog_ids().len(), 3);
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use iap_kernel_testkit::generators::{history, expected_owned};
//!
//! proptest! {
//!     #[test]
//!     fn replay_matches_model(records in history(4, 32)) {
//!         let store = iap_kernel_store::EntitlementStore::new();
//!         store.reconcile(&records);
//!         prop_assert_eq!(store.snapshot(), expected_owned(&records));
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{catalog_json, TestFixture};
