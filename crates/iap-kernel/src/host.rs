//! Completion delivery to a host application.
//!
//! The host calls into [`HostBridge`] from its own thread. Each call returns a
//! [`RequestId`] at once and runs on the tokio runtime; when the work is
//! done exactly one [`Completion`] for that request is pushed onto the
//! [`CompletionQueue`]. The host drains the queue on its own scheduling turn,
//! so results never touch host state from a runtime thread.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use iap_kernel_core::ProductId;
use iap_kernel_sync::{Catalog, Ledger};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::kernel::{
    InitializeResponse, Kernel, ProductsResponse, PurchaseResponse, RestoreResponse,
};

/// Identifies one host call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The result of one host call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Initialized(InitializeResponse),
    Products(ProductsResponse),
    Purchased(PurchaseResponse),
    Restored(RestoreResponse),
}

/// A finished host call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub request: RequestId,
    pub event: HostEvent,
}

/// Receiving end of the completion channel.
#[derive(Debug)]
pub struct CompletionQueue {
    receiver: mpsc::UnboundedReceiver<Completion>,
}

impl CompletionQueue {
    /// Take a ready completion without blocking.
    pub fn try_next(&mut self) -> Option<Completion> {
        self.receiver.try_recv().ok()
    }

    /// Wait for the next completion.
    ///
    /// Returns `None` once the bridge is dropped and every in-flight call
    /// has been delivered.
    pub async fn next(&mut self) -> Option<Completion> {
        self.receiver.recv().await
    }

    /// Drain every ready completion.
    pub fn drain(&mut self) -> Vec<Completion> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

/// Runs kernel calls on a runtime and reports them through a
/// [`CompletionQueue`].
pub struct HostBridge<L: Ledger + 'static, C: Catalog + 'static> {
    kernel: Arc<Kernel<L, C>>,
    runtime: Handle,
    completions: mpsc::UnboundedSender<Completion>,
    next_request: AtomicU64,
}

impl<L: Ledger + 'static, C: Catalog + 'static> HostBridge<L, C> {
    /// Create a bridge that spawns work on `runtime`.
    pub fn new(kernel: Arc<Kernel<L, C>>, runtime: Handle) -> (Self, CompletionQueue) {
        let (completions, receiver) = mpsc::unbounded_channel();
        let bridge = Self {
            kernel,
            runtime,
            completions,
            next_request: AtomicU64::new(1),
        };
        (bridge, CompletionQueue { receiver })
    }

    /// The kernel behind the bridge.
    pub fn kernel(&self) -> &Arc<Kernel<L, C>> {
        &self.kernel
    }

    /// Start the listener and load entitlements.
    pub fn initialize(&self) -> RequestId {
        self.dispatch(|kernel| async move { HostEvent::Initialized(kernel.initialize().await) })
    }

    /// Fetch product descriptors.
    pub fn get_products<I, S>(&self, ids: I) -> RequestId
    where
        I: IntoIterator<Item = S>,
        S: Into<ProductId>,
    {
        let ids: Vec<ProductId> = ids.into_iter().map(Into::into).collect();
        self.dispatch(|kernel| async move { HostEvent::Products(kernel.get_products(&ids).await) })
    }

    /// Purchase a product.
    pub fn purchase(&self, product_id: impl Into<ProductId>) -> RequestId {
        let product_id = product_id.into();
        self.dispatch(|kernel| async move {
            HostEvent::Purchased(kernel.purchase(&product_id).await)
        })
    }

    /// Sync with the ledger and reconcile.
    pub fn restore_purchases(&self) -> RequestId {
        self.dispatch(|kernel| async move { HostEvent::Restored(kernel.restore_purchases().await) })
    }

    /// Whether the product is currently owned. Answers immediately.
    pub fn is_purchased(&self, product_id: impl Into<ProductId>) -> bool {
        self.kernel.is_purchased(&product_id.into())
    }

    fn dispatch<F, Fut>(&self, work: F) -> RequestId
    where
        F: FnOnce(Arc<Kernel<L, C>>) -> Fut,
        Fut: Future<Output = HostEvent> + Send + 'static,
    {
        let request = RequestId(self.next_request.fetch_add(1, Ordering::Relaxed));
        let completions = self.completions.clone();
        let work = work(Arc::clone(&self.kernel));

        self.runtime.spawn(async move {
            let event = work.await;
            if completions.send(Completion { request, event }).is_err() {
                tracing::debug!(%request, "completion queue dropped; discarding result");
            }
        });

        request
    }
}
