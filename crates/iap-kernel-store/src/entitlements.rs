//! The owned-products set and its merge rules.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use iap_kernel_core::{ProductId, RecordVersion, Transaction};

/// Result of applying a single transaction to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// The product is now owned and was not before.
    Granted,
    /// The product was owned and no longer is.
    Revoked,
    /// The record won but ownership did not change.
    Unchanged,
    /// An equal or newer record was already applied (idempotent - not an error).
    Stale,
}

/// Counts of a reconcile pass, by [`ApplyResult`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub granted: usize,
    pub revoked: usize,
    pub unchanged: usize,
    pub stale: usize,
}

impl ReconcileSummary {
    fn record(&mut self, result: ApplyResult) {
        match result {
            ApplyResult::Granted => self.granted += 1,
            ApplyResult::Revoked => self.revoked += 1,
            ApplyResult::Unchanged => self.unchanged += 1,
            ApplyResult::Stale => self.stale += 1,
        }
    }

    /// Whether the pass changed the owned set.
    pub fn changed(&self) -> bool {
        self.granted > 0 || self.revoked > 0
    }
}

/// The entitlement store.
///
/// Thread-safe via RwLock. Starts empty; the remote ledger is the source of
/// truth, so nothing is persisted.
#[derive(Debug, Default)]
pub struct EntitlementStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Winning record per product.
    latest: HashMap<ProductId, Entry>,

    /// Products whose winning record is not revoked.
    owned: BTreeSet<ProductId>,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    version: RecordVersion,
}

impl StoreInner {
    fn apply(&mut self, tx: &Transaction) -> ApplyResult {
        let version = tx.version();

        if let Some(entry) = self.latest.get(&tx.product_id) {
            if entry.version >= version {
                return ApplyResult::Stale;
            }
        }
        self.latest.insert(tx.product_id.clone(), Entry { version });

        if tx.is_revoked() {
            if self.owned.remove(&tx.product_id) {
                ApplyResult::Revoked
            } else {
                ApplyResult::Unchanged
            }
        } else if self.owned.insert(tx.product_id.clone()) {
            ApplyResult::Granted
        } else {
            ApplyResult::Unchanged
        }
    }
}

impl EntitlementStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a batch of verified transactions into the owned set.
    ///
    /// Each record is applied if it is newer than the record that last
    /// decided its product: active records insert the product, revoked
    /// records remove it. The set is never cleared, and the batch is applied
    /// atomically with respect to readers and other passes.
    pub fn reconcile<'a, I>(&self, records: I) -> ReconcileSummary
    where
        I: IntoIterator<Item = &'a Transaction>,
    {
        let mut summary = ReconcileSummary::default();
        let mut inner = self.write();

        for tx in records {
            let result = inner.apply(tx);
            if matches!(result, ApplyResult::Granted | ApplyResult::Revoked) {
                tracing::debug!(
                    product_id = %tx.product_id,
                    transaction_id = %tx.id,
                    ?result,
                    "entitlement changed"
                );
            }
            summary.record(result);
        }

        summary
    }

    /// Copy of the currently owned products.
    pub fn snapshot(&self) -> BTreeSet<ProductId> {
        self.read().owned.clone()
    }

    /// Point membership query.
    pub fn contains(&self, product_id: &ProductId) -> bool {
        self.read().owned.contains(product_id)
    }

    /// Number of owned products.
    pub fn len(&self) -> usize {
        self.read().owned.len()
    }

    /// Check if nothing is owned.
    pub fn is_empty(&self) -> bool {
        self.read().owned.is_empty()
    }

    /// The version of the record that currently decides `product_id`.
    pub fn version_of(&self, product_id: &ProductId) -> Option<RecordVersion> {
        self.read().latest.get(product_id).map(|e| e.version)
    }

    // A panic while holding the lock cannot leave a half-applied record:
    // `apply` mutates `latest` before `owned` and each step is a single
    // collection call, so the data is usable after poisoning.
    fn read(&self) -> RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use iap_kernel_core::{ProductKind, TransactionBuilder};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn active(id: u64, product: &str, at: i64) -> Transaction {
        TransactionBuilder::new(id, product).purchased_at(at).build()
    }

    fn revoked(id: u64, product: &str, purchased: i64, at: i64) -> Transaction {
        active(id, product, purchased).revoked_at(at)
    }

    #[test]
    fn test_reconcile_inserts_active() {
        let store = EntitlementStore::new();
        let summary = store.reconcile(&[active(1, "premium", 10)]);

        assert_eq!(summary.granted, 1);
        assert!(store.contains(&ProductId::from("premium")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reconcile_removes_revoked() {
        let store = EntitlementStore::new();
        store.reconcile(&[active(1, "sub_monthly", 10)]);

        let summary = store.reconcile(&[revoked(1, "sub_monthly", 10, 20)]);
        assert_eq!(summary.revoked, 1);
        assert!(!store.contains(&ProductId::from("sub_monthly")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_reconcile_does_not_clear() {
        let store = EntitlementStore::new();
        store.reconcile(&[active(1, "premium", 10), active(2, "no_ads", 11)]);
        store.reconcile(&[active(1, "premium", 10)]);

        assert_eq!(
            store.snapshot(),
            BTreeSet::from([ProductId::from("no_ads"), ProductId::from("premium")])
        );
    }

    #[test]
    fn test_stale_revocation_ignored() {
        let store = EntitlementStore::new();
        // Re-purchase after an old refund arrives before the refund itself.
        store.reconcile(&[active(5, "premium", 100)]);
        let summary = store.reconcile(&[revoked(1, "premium", 10, 20)]);

        assert_eq!(summary.stale, 1);
        assert!(store.contains(&ProductId::from("premium")));
    }

    #[test]
    fn test_reconcile_idempotent() {
        let store = EntitlementStore::new();
        let batch = vec![
            active(1, "premium", 10),
            revoked(2, "sub_monthly", 11, 30),
            TransactionBuilder::new(3, "coins_100")
                .kind(ProductKind::Consumable)
                .purchased_at(12)
                .build(),
        ];

        store.reconcile(&batch);
        let once = store.snapshot();
        let second = store.reconcile(&batch);

        assert_eq!(store.snapshot(), once);
        assert!(!second.changed());
        assert_eq!(second.stale, batch.len());
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = EntitlementStore::new();
        store.reconcile(&[active(1, "premium", 10)]);
        let snap = store.snapshot();
        store.reconcile(&[revoked(1, "premium", 10, 11)]);

        assert!(snap.contains(&ProductId::from("premium")));
        assert!(!store.contains(&ProductId::from("premium")));
    }

    #[test]
    fn test_version_of_tracks_winner() {
        let store = EntitlementStore::new();
        let tx = active(4, "premium", 50);
        store.reconcile(&[tx.clone()]);
        assert_eq!(store.version_of(&tx.product_id), Some(tx.version()));
        assert_eq!(store.version_of(&ProductId::from("other")), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reconcile_converges() {
        let products = ["a", "b", "c", "d"];
        let mut records = Vec::new();
        for (i, p) in products.iter().enumerate() {
            let base = (i as i64) * 100;
            records.push(active(i as u64 * 10 + 1, p, base));
            records.push(revoked(i as u64 * 10 + 1, p, base, base + 5));
            if i % 2 == 0 {
                records.push(active(i as u64 * 10 + 2, p, base + 10));
            }
        }

        let sequential = EntitlementStore::new();
        sequential.reconcile(&records);

        let store = Arc::new(EntitlementStore::new());
        let mut tasks = Vec::new();
        for k in 0..8 {
            let store = Arc::clone(&store);
            // Overlapping subsets in different orders.
            let mut subset: Vec<_> = records.iter().skip(k % 3).cloned().collect();
            if k % 2 == 1 {
                subset.reverse();
            }
            tasks.push(tokio::spawn(async move {
                store.reconcile(&subset);
            }));
        }
        // Every record appears at least in the k % 3 == 0 subsets.
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(store.snapshot(), sequential.snapshot());
        assert_eq!(
            store.snapshot(),
            BTreeSet::from([ProductId::from("a"), ProductId::from("c")])
        );
    }

    fn record_strategy() -> impl Strategy<Value = Transaction> {
        (0usize..4, 1u64..20, 0i64..50, proptest::option::of(0i64..50)).prop_map(
            |(p, id, at, revoke)| {
                let tx = active(id, ["a", "b", "c", "d"][p], at);
                match revoke {
                    Some(delay) => tx.revoked_at(at + delay),
                    None => tx,
                }
            },
        )
    }

    proptest! {
        #[test]
        fn prop_reconcile_order_independent(
            records in proptest::collection::vec(record_strategy(), 0..24),
            seed in any::<u64>(),
        ) {
            let forward = EntitlementStore::new();
            forward.reconcile(&records);

            let mut shuffled = records.clone();
            // Deterministic shuffle driven by the seed.
            let len = shuffled.len();
            if len > 1 {
                for i in (1..len).rev() {
                    let j = (seed.wrapping_mul(i as u64 + 31) % (i as u64 + 1)) as usize;
                    shuffled.swap(i, j);
                }
            }
            let permuted = EntitlementStore::new();
            for tx in &shuffled {
                permuted.reconcile(std::iter::once(tx));
            }

            prop_assert_eq!(forward.snapshot(), permuted.snapshot());
        }

        #[test]
        fn prop_reconcile_idempotent(records in proptest::collection::vec(record_strategy(), 0..24)) {
            let store = EntitlementStore::new();
            store.reconcile(&records);
            let once = store.snapshot();
            store.reconcile(&records);
            prop_assert_eq!(store.snapshot(), once);
        }

        #[test]
        fn prop_contains_iff_latest_not_revoked(records in proptest::collection::vec(record_strategy(), 1..24)) {
            let store = EntitlementStore::new();
            store.reconcile(&records);

            for product in ["a", "b", "c", "d"] {
                let latest = records
                    .iter()
                    .filter(|tx| tx.product_id.as_str() == product)
                    .max_by_key(|tx| tx.version());
                let expected = latest.map(|tx| !tx.is_revoked()).unwrap_or(false);
                prop_assert_eq!(store.contains(&ProductId::from(product)), expected);
            }
        }
    }
}
