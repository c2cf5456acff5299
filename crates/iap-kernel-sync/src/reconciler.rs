//! Ledger reconciliation.
//!
//! Pulls the ledger's current entitlement snapshot, runs every record
//! through the verification gate and merges the accepted ones into the
//! entitlement store.

use std::collections::BTreeSet;
use std::sync::Arc;

use iap_kernel_core::{verify, ProductId, Transaction};
use iap_kernel_store::{EntitlementStore, ReconcileSummary};

use crate::error::Result;
use crate::ledger::Ledger;

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Records that passed verification.
    pub accepted: usize,
    /// Records dropped by the verification gate.
    pub rejected: usize,
    /// How the accepted records changed the store.
    pub summary: ReconcileSummary,
    /// Owned products after the merge.
    pub owned: BTreeSet<ProductId>,
}

/// Reconciles the entitlement store against a ledger.
///
/// Cheap to clone; clones share the ledger and the store. Safe to run from
/// several tasks at once: the store's merge makes concurrent passes
/// commutative.
pub struct Reconciler<L: ?Sized> {
    ledger: Arc<L>,
    store: Arc<EntitlementStore>,
}

impl<L: ?Sized> Clone for Reconciler<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            store: Arc::clone(&self.store),
        }
    }
}

impl<L: Ledger + ?Sized> Reconciler<L> {
    /// Create a reconciler over a ledger and a store.
    pub fn new(ledger: Arc<L>, store: Arc<EntitlementStore>) -> Self {
        Self { ledger, store }
    }

    /// The ledger this reconciler reads from.
    pub fn ledger(&self) -> &Arc<L> {
        &self.ledger
    }

    /// The store this reconciler writes to.
    pub fn store(&self) -> &Arc<EntitlementStore> {
        &self.store
    }

    /// Run one reconciliation pass and return the owned set.
    pub async fn run_reconciliation(&self) -> Result<BTreeSet<ProductId>> {
        Ok(self.reconcile().await?.owned)
    }

    /// Run one reconciliation pass.
    ///
    /// Records failing verification are logged and skipped; the pass
    /// continues with the rest.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let envelopes = self.ledger.current_entitlements().await?;

        let mut accepted = Vec::with_capacity(envelopes.len());
        let mut rejected = 0;

        for envelope in envelopes {
            match verify(envelope) {
                Ok(tx) => accepted.push(tx),
                Err(failed) => {
                    rejected += 1;
                    tracing::warn!(
                        product_id = %failed.product_id,
                        transaction_id = %failed.transaction_id,
                        reason = %failed.reason,
                        "skipping unverified transaction"
                    );
                }
            }
        }

        let summary = self.store.reconcile(&accepted);
        let report = ReconcileReport {
            accepted: accepted.len(),
            rejected,
            summary,
            owned: self.store.snapshot(),
        };

        tracing::debug!(
            accepted = report.accepted,
            rejected = report.rejected,
            owned = report.owned.len(),
            "reconciliation pass complete"
        );

        Ok(report)
    }

    /// Merge a single transaction that has already passed verification.
    pub fn apply_verified(&self, tx: &Transaction) -> ReconcileSummary {
        self.store.reconcile(std::iter::once(tx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::memory::MemoryLedger;
    use iap_kernel_core::ProductKind;
    use proptest::prelude::*;

    fn setup() -> (Arc<MemoryLedger>, Reconciler<MemoryLedger>) {
        let ledger = MemoryLedger::new();
        let reconciler = Reconciler::new(Arc::clone(&ledger), Arc::new(EntitlementStore::new()));
        (ledger, reconciler)
    }

    #[tokio::test]
    async fn test_reconcile_picks_up_grants() {
        let (ledger, reconciler) = setup();
        ledger.grant("premium", ProductKind::NonConsumable);
        ledger.grant("sub_monthly", ProductKind::AutoRenewable);

        let owned = reconciler.run_reconciliation().await.unwrap();
        assert_eq!(
            owned,
            BTreeSet::from([ProductId::from("premium"), ProductId::from("sub_monthly")])
        );
    }

    #[tokio::test]
    async fn test_reconcile_skips_unverified_and_continues() {
        let (ledger, reconciler) = setup();
        ledger.grant("premium", ProductKind::NonConsumable);
        ledger.inject_forged("pirated", ProductKind::NonConsumable);

        let report = reconciler.reconcile().await.unwrap();
        assert_eq!(report.accepted, 1);
        assert_eq!(report.rejected, 1);
        assert!(report.owned.contains(&ProductId::from("premium")));
        assert!(!report.owned.contains(&ProductId::from("pirated")));
    }

    #[tokio::test]
    async fn test_reconcile_applies_revocation() {
        let (ledger, reconciler) = setup();
        ledger.grant("sub_monthly", ProductKind::AutoRenewable);
        reconciler.reconcile().await.unwrap();
        assert!(reconciler.store().contains(&ProductId::from("sub_monthly")));

        ledger.revoke("sub_monthly").unwrap();
        let report = reconciler.reconcile().await.unwrap();

        assert_eq!(report.summary.revoked, 1);
        assert!(!reconciler.store().contains(&ProductId::from("sub_monthly")));
    }

    #[tokio::test]
    async fn test_reconcile_propagates_ledger_failure() {
        let (ledger, reconciler) = setup();
        ledger.fail_snapshots(Some(LedgerError::Network("offline".into())));

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(err.is_network());
        assert!(reconciler.store().is_empty());
    }

    #[derive(Debug, Clone)]
    enum Event {
        Grant(usize),
        Revoke(usize),
        Forge(usize),
    }

    fn event() -> impl Strategy<Value = Event> {
        prop_oneof![
            (0usize..6).prop_map(Event::Grant),
            (0usize..6).prop_map(Event::Revoke),
            (0usize..6).prop_map(Event::Forge),
        ]
    }

    proptest! {
        #[test]
        fn reconcile_tracks_ledger_after_every_event(
            events in proptest::collection::vec(event(), 0..24),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let (ledger, reconciler) = setup();
            let mut expected = BTreeSet::new();

            for event in events {
                match event {
                    Event::Grant(i) => {
                        ledger.grant(format!("p{i}"), ProductKind::NonConsumable);
                        expected.insert(ProductId::from(format!("p{i}")));
                    }
                    Event::Revoke(i) => {
                        if ledger.revoke(format!("p{i}")).is_some() {
                            expected.remove(&ProductId::from(format!("p{i}")));
                        }
                    }
                    Event::Forge(i) => {
                        ledger.inject_forged(format!("p{i}"), ProductKind::NonConsumable);
                    }
                }
                let owned = runtime.block_on(reconciler.run_reconciliation()).unwrap();
                prop_assert_eq!(&owned, &expected);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_passes_agree() {
        let (ledger, reconciler) = setup();
        for i in 0..16 {
            ledger.grant(format!("item_{i}"), ProductKind::NonConsumable);
        }
        ledger.revoke("item_3").unwrap();

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let reconciler = reconciler.clone();
            tasks.push(tokio::spawn(async move { reconciler.run_reconciliation().await }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap().unwrap());
        }

        let final_set = reconciler.store().snapshot();
        assert_eq!(final_set.len(), 15);
        assert!(!final_set.contains(&ProductId::from("item_3")));
        // Every pass saw a consistent, fully merged snapshot.
        for owned in results {
            assert_eq!(owned, final_set);
        }
    }
}
