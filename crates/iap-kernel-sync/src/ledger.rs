//! Ledger abstraction: the remote store's transaction ledger.
//!
//! The ledger's own transport and cryptography are opaque. It hands out
//! [`VerificationResult`] envelopes and accepts purchase and finish requests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use iap_kernel_core::{ProductDescriptor, Transaction, VerificationResult};

use crate::error::Result;

/// What the ledger reports for a purchase request that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurchaseResult {
    /// The purchase went through; the envelope carries the verdict.
    Success(VerificationResult),
    /// Waiting on external approval (parental consent, strong auth).
    Pending,
    /// The user backed out.
    UserCancelled,
}

/// Ledger trait for the remote transaction ledger.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Fetch the current entitlement snapshot.
    ///
    /// A finite sequence, replayed in full on every call.
    async fn current_entitlements(&self) -> Result<Vec<VerificationResult>>;

    /// Open a fresh subscription to the live update stream.
    async fn subscribe(&self) -> Result<UpdateStream>;

    /// Request a purchase of `product`.
    async fn purchase(&self, product: &ProductDescriptor) -> Result<PurchaseResult>;

    /// Acknowledge a transaction so it is not delivered again.
    async fn finish(&self, transaction: &Transaction) -> Result<()>;

    /// Force the ledger to refresh from the store (restore purchases).
    async fn sync(&self) -> Result<()>;
}

/// A cancellable subscription to the ledger's live update stream.
///
/// Conceptually infinite: it ends only when closed locally or dropped by the
/// ledger. Dropping or closing it closes the subscription.
#[derive(Debug)]
pub struct UpdateStream {
    receiver: mpsc::Receiver<VerificationResult>,
}

impl UpdateStream {
    /// Wrap the receiving half of an update channel.
    pub fn new(receiver: mpsc::Receiver<VerificationResult>) -> Self {
        Self { receiver }
    }

    /// Create a connected sender and stream with the given buffer.
    pub fn channel(capacity: usize) -> (mpsc::Sender<VerificationResult>, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self::new(rx))
    }

    /// Wait for the next update. `None` once the ledger side is gone.
    pub async fn next(&mut self) -> Option<VerificationResult> {
        self.receiver.recv().await
    }

    /// Close the subscription. Buffered updates are discarded.
    pub fn close(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }
}
