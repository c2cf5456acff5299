//! The purchase orchestrator.
//!
//! Drives one purchase attempt end to end:
//!
//! ```text
//! resolve ─┬─ not found ────────────────────────────────> Error(ProductNotFound)
//!          └─ request ─┬─ verified ── finish ── reconcile > Successful
//!                      ├─ unverified ─────────────────────> SuccessfulButUnverified
//!                      ├─ pending ────────────────────────> PendingAuthorization
//!                      ├─ cancelled ──────────────────────> UserCancelled
//!                      └─ transport failure ──────────────> Error(kind)
//! ```
//!
//! Steps run strictly in sequence and every attempt ends in exactly one
//! [`PurchaseOutcome`].

use std::sync::Arc;

use iap_kernel_core::{verify, ProductDescriptor, ProductId, Transaction, VerificationResult};
use iap_kernel_sync::{Catalog, Ledger, PurchaseResult, Reconciler};

use crate::config::UnverifiedPolicy;
use crate::error::{ErrorKind, KernelError, PurchaseStatus, Result};

/// Terminal outcome of a purchase attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// Verified, finished and reconciled.
    Successful,
    /// Confirmed by the ledger but the signature did not verify.
    SuccessfulButUnverified,
    /// Waiting for external approval. The listener picks up the result.
    PendingAuthorization,
    /// The user backed out.
    UserCancelled,
    /// The attempt failed.
    Error(ErrorKind),
}

impl PurchaseOutcome {
    /// Status code reported to the host.
    pub fn status(self) -> PurchaseStatus {
        match self {
            PurchaseOutcome::Successful => PurchaseStatus::Successful,
            PurchaseOutcome::SuccessfulButUnverified => PurchaseStatus::SuccessfulButUnverified,
            PurchaseOutcome::PendingAuthorization => PurchaseStatus::PendingAuthorization,
            PurchaseOutcome::UserCancelled => PurchaseStatus::UserCancelled,
            PurchaseOutcome::Error(_) => PurchaseStatus::Error,
        }
    }

    /// Error kind reported to the host. Cancellation is a status, not an error.
    pub fn error(self) -> ErrorKind {
        match self {
            PurchaseOutcome::Error(kind) => kind,
            _ => ErrorKind::None,
        }
    }
}

/// Runs purchase attempts against a catalog and a ledger.
pub struct PurchaseOrchestrator<L: ?Sized, C: ?Sized> {
    catalog: Arc<C>,
    reconciler: Reconciler<L>,
    policy: UnverifiedPolicy,
}

impl<L: ?Sized, C: ?Sized> Clone for PurchaseOrchestrator<L, C> {
    fn clone(&self) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            reconciler: self.reconciler.clone(),
            policy: self.policy,
        }
    }
}

impl<L, C> PurchaseOrchestrator<L, C>
where
    L: Ledger + ?Sized,
    C: Catalog + ?Sized,
{
    /// Create an orchestrator.
    pub fn new(catalog: Arc<C>, reconciler: Reconciler<L>, policy: UnverifiedPolicy) -> Self {
        Self {
            catalog,
            reconciler,
            policy,
        }
    }

    /// Run one purchase attempt to its terminal outcome.
    pub async fn purchase(&self, product_id: &ProductId) -> PurchaseOutcome {
        let outcome = match self.attempt(product_id).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(%product_id, error = %e, "purchase failed");
                PurchaseOutcome::Error(e.kind())
            }
        };

        tracing::info!(%product_id, ?outcome, "purchase complete");
        outcome
    }

    async fn attempt(&self, product_id: &ProductId) -> Result<PurchaseOutcome> {
        let product = self.resolve(product_id).await?;

        match self.reconciler.ledger().purchase(&product).await? {
            PurchaseResult::Success(envelope) => self.complete(envelope).await,
            PurchaseResult::Pending => Ok(PurchaseOutcome::PendingAuthorization),
            PurchaseResult::UserCancelled => Ok(PurchaseOutcome::UserCancelled),
        }
    }

    async fn resolve(&self, product_id: &ProductId) -> Result<ProductDescriptor> {
        self.catalog
            .products(std::slice::from_ref(product_id))
            .await?
            .into_iter()
            .find(|p| &p.id == product_id)
            .ok_or_else(|| KernelError::ProductNotFound(product_id.clone()))
    }

    async fn complete(&self, envelope: VerificationResult) -> Result<PurchaseOutcome> {
        match verify(envelope) {
            Ok(tx) => {
                self.settle(&tx).await;
                Ok(PurchaseOutcome::Successful)
            }
            Err(failed) => {
                tracing::warn!(
                    product_id = %failed.product_id,
                    transaction_id = %failed.transaction_id,
                    reason = %failed.reason,
                    policy = ?self.policy,
                    "purchase confirmed without a valid signature"
                );
                match self.policy {
                    UnverifiedPolicy::Accept => Ok(PurchaseOutcome::SuccessfulButUnverified),
                    UnverifiedPolicy::Reject => Err(failed.into()),
                }
            }
        }
    }

    /// Record a verified purchase locally, acknowledge it and reconcile.
    ///
    /// The transaction is merged into the store before it is finished, so a
    /// finished transaction is always reflected locally. Neither a failed
    /// finish nor a failed pass changes the outcome: the ledger redelivers
    /// unfinished transactions and the store already owns the product.
    async fn settle(&self, tx: &Transaction) {
        self.reconciler.apply_verified(tx);

        if let Err(e) = self.reconciler.ledger().finish(tx).await {
            tracing::warn!(
                product_id = %tx.product_id,
                transaction_id = %tx.id,
                error = %e,
                "finishing transaction failed; ledger will redeliver"
            );
        }

        if let Err(e) = self.reconciler.reconcile().await {
            tracing::warn!(
                product_id = %tx.product_id,
                error = %e,
                "reconciliation after purchase failed"
            );
        }
    }
}
