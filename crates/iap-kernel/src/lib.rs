//! # IAP Kernel
//!
//! The unified API for the IAP Kernel: a client-side purchase-entitlement
//! engine that keeps a local "owned products" set in agreement with a remote
//! store's transaction ledger and drives purchases to a classified outcome.
//!
//! ## Overview
//!
//! - **Entitlements**: the owned set is rebuilt from the ledger's signed
//!   records on every reconciliation pass
//! - **Live updates**: a background listener reconciles on every ledger event
//!   (renewals, refunds, purchases made elsewhere)
//! - **Purchases**: [`PurchaseOrchestrator`] resolves, requests, classifies,
//!   finishes and reconciles one purchase attempt
//! - **Host delivery**: [`HostBridge`] runs calls in the background and
//!   pushes exactly one [`Completion`] per call onto a queue the host drains
//!   on its own turn
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use iap_kernel::{Kernel, KernelConfig, PurchaseStatus};
//! use iap_kernel::core::{ProductDescriptor, ProductId, ProductKind};
//! use iap_kernel::sync::{MemoryCatalog, MemoryLedger};
//!
//! async fn example() {
//!     let ledger = MemoryLedger::new();
//!     let catalog = Arc::new(MemoryCatalog::new().with_product(ProductDescriptor::new(
//!         "premium",
//!         "Premium",
//!         "$4.99",
//!         ProductKind::NonConsumable,
//!     )));
//!
//!     let kernel = Kernel::new(ledger, catalog, KernelConfig::default());
//!     kernel.initialize().await;
//!
//!     let response = kernel.purchase(&ProductId::from("premium")).await;
//!     if response.status == PurchaseStatus::Successful {
//!         assert!(kernel.is_purchased(&ProductId::from("premium")));
//!     }
//!
//!     kernel.shutdown().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `iap_kernel::core` - Core primitives (ProductId, Transaction, verification)
//! - `iap_kernel::store` - The entitlement store
//! - `iap_kernel::sync` - Ledger traits, reconciler, listener, in-memory ledger

pub mod config;
pub mod error;
pub mod host;
pub mod kernel;
pub mod orchestrator;

// Re-export component crates
pub use iap_kernel_core as core;
pub use iap_kernel_store as store;
pub use iap_kernel_sync as sync;

// Re-export main types for convenience
pub use config::{KernelConfig, UnverifiedPolicy};
pub use error::{ErrorKind, KernelError, PurchaseStatus, Result, UnknownCode};
pub use host::{Completion, CompletionQueue, HostBridge, HostEvent, RequestId};
pub use kernel::{InitializeResponse, Kernel, ProductsResponse, PurchaseResponse, RestoreResponse};
pub use orchestrator::{PurchaseOrchestrator, PurchaseOutcome};

// Re-export commonly used core types
pub use iap_kernel_core::{ProductDescriptor, ProductId, ProductKind, Transaction};
