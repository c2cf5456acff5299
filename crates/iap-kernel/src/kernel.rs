//! The Kernel: the host-facing call surface.
//!
//! Ties the entitlement store, the reconciler, the update listener and the
//! purchase orchestrator together. Every call reports through a response
//! struct carrying a stable [`ErrorKind`]; no failure escapes as a `Result`.

use std::collections::BTreeSet;
use std::sync::Arc;

use iap_kernel_core::{ProductDescriptor, ProductId};
use iap_kernel_store::EntitlementStore;
use iap_kernel_sync::{Catalog, Ledger, ListenerHandle, Reconciler, TransactionListener};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::KernelConfig;
use crate::error::{ErrorKind, KernelError, PurchaseStatus};
use crate::orchestrator::PurchaseOrchestrator;

/// Reported by [`Kernel::initialize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub error: ErrorKind,
    pub owned: BTreeSet<ProductId>,
}

/// Reported by [`Kernel::get_products`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductsResponse {
    pub error: ErrorKind,
    pub products: Vec<ProductDescriptor>,
}

/// Reported by [`Kernel::purchase`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseResponse {
    pub product_id: ProductId,
    pub error: ErrorKind,
    pub status: PurchaseStatus,
}

/// Reported by [`Kernel::restore_purchases`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub error: ErrorKind,
    pub owned: BTreeSet<ProductId>,
}

/// The main Kernel struct.
///
/// Provides a unified API for:
/// - Starting the update listener and loading entitlements
/// - Fetching product metadata
/// - Purchasing products
/// - Querying and restoring ownership
pub struct Kernel<L: Ledger + 'static, C: Catalog> {
    /// The remote product catalog.
    catalog: Arc<C>,
    /// Reconciler over the ledger and the owned set.
    reconciler: Reconciler<L>,
    /// Purchase state machine.
    orchestrator: PurchaseOrchestrator<L, C>,
    /// Configuration.
    config: KernelConfig,
    /// Running listener, if any.
    listener: Mutex<Option<ListenerHandle>>,
}

impl<L: Ledger + 'static, C: Catalog> Kernel<L, C> {
    /// Create a new kernel instance with an empty owned set.
    pub fn new(ledger: Arc<L>, catalog: Arc<C>, config: KernelConfig) -> Self {
        let store = Arc::new(EntitlementStore::new());
        let reconciler = Reconciler::new(ledger, store);
        let orchestrator = PurchaseOrchestrator::new(
            Arc::clone(&catalog),
            reconciler.clone(),
            config.unverified_policy,
        );

        Self {
            catalog,
            reconciler,
            orchestrator,
            config,
            listener: Mutex::new(None),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Get the entitlement store.
    pub fn store(&self) -> &Arc<EntitlementStore> {
        self.reconciler.store()
    }

    /// Get the ledger.
    pub fn ledger(&self) -> &Arc<L> {
        self.reconciler.ledger()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start the update listener (unless disabled) and run one pass.
    ///
    /// Safe to call again: a live listener is kept, a stopped one is
    /// replaced. Must be called from within a tokio runtime.
    pub async fn initialize(&self) -> InitializeResponse {
        let mut error = ErrorKind::None;

        if self.config.listen_for_updates {
            if let Err(e) = self.ensure_listener().await {
                tracing::warn!(error = %e, "could not start transaction listener");
                error = e.kind();
            }
        }

        let owned = match self.reconciler.run_reconciliation().await {
            Ok(owned) => owned,
            Err(e) => {
                let e = KernelError::from(e);
                tracing::warn!(error = %e, "initial reconciliation failed");
                error = e.kind();
                self.owned_products()
            }
        };

        tracing::info!(owned = owned.len(), ?error, "kernel initialized");
        InitializeResponse { error, owned }
    }

    /// Cancel the update listener and wait for it to stop.
    pub async fn shutdown(&self) {
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.cancel();
            if let Some(stats) = handle.join().await {
                tracing::info!(
                    events = stats.events,
                    passes = stats.passes,
                    "kernel shut down"
                );
            }
        }
    }

    /// Whether the update listener is running.
    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .map_or(false, |h| !h.is_cancelled() && !h.is_finished())
    }

    async fn ensure_listener(&self) -> Result<(), KernelError> {
        let mut slot = self.listener.lock().await;
        if let Some(handle) = slot.as_ref() {
            if !handle.is_finished() {
                tracing::debug!("transaction listener already running");
                return Ok(());
            }
        }

        let listener =
            TransactionListener::new(self.reconciler.clone(), self.config.listener.clone());
        *slot = Some(listener.start().await?);
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch descriptors for `ids`. Unknown identifiers are left out.
    pub async fn get_products(&self, ids: &[ProductId]) -> ProductsResponse {
        match self.catalog.products(ids).await {
            Ok(products) => ProductsResponse {
                error: ErrorKind::None,
                products,
            },
            Err(e) => {
                let e = KernelError::from(e);
                tracing::warn!(requested = ids.len(), error = %e, "product fetch failed");
                ProductsResponse {
                    error: e.kind(),
                    products: Vec::new(),
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Purchases
    // ─────────────────────────────────────────────────────────────────────────

    /// Purchase a product.
    ///
    /// When the status is `Successful`, [`is_purchased`](Self::is_purchased)
    /// already returns `true` for the product.
    pub async fn purchase(&self, product_id: &ProductId) -> PurchaseResponse {
        let outcome = self.orchestrator.purchase(product_id).await;
        PurchaseResponse {
            product_id: product_id.clone(),
            error: outcome.error(),
            status: outcome.status(),
        }
    }

    /// Whether the product is currently owned. No I/O.
    ///
    /// A consumable stays owned once bought on this device, even after the
    /// ledger stops listing it. Hosts should track consumable balances
    /// themselves rather than gate on this.
    pub fn is_purchased(&self, product_id: &ProductId) -> bool {
        self.store().contains(product_id)
    }

    /// Copy of the currently owned products. No I/O.
    pub fn owned_products(&self) -> BTreeSet<ProductId> {
        self.store().snapshot()
    }

    /// Force a ledger sync, then reconcile.
    pub async fn restore_purchases(&self) -> RestoreResponse {
        if let Err(e) = self.ledger().sync().await {
            let e = KernelError::from(e);
            tracing::warn!(error = %e, "restore: ledger sync failed");
            return RestoreResponse {
                error: e.kind(),
                owned: self.owned_products(),
            };
        }

        match self.reconciler.run_reconciliation().await {
            Ok(owned) => RestoreResponse {
                error: ErrorKind::None,
                owned,
            },
            Err(e) => {
                let e = KernelError::from(e);
                tracing::warn!(error = %e, "restore: reconciliation failed");
                RestoreResponse {
                    error: e.kind(),
                    owned: self.owned_products(),
                }
            }
        }
    }
}
