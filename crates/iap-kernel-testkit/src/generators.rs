//! Proptest generators for property-based testing.

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;

use iap_kernel_core::{
    Keypair, ProductId, ProductKind, RecordVersion, Transaction, TransactionBuilder,
};

/// Generate a random keypair.
pub fn keypair() -> impl Strategy<Value = Keypair> {
    any::<[u8; 32]>().prop_map(|seed| Keypair::from_seed(&seed))
}

/// Generate a product identifier from a small pool, so records collide.
pub fn product_id(pool: usize) -> impl Strategy<Value = ProductId> {
    (0..pool.max(1)).prop_map(|i| ProductId::from(format!("product_{i}")))
}

/// Generate a ProductKind.
pub fn product_kind() -> impl Strategy<Value = ProductKind> {
    prop_oneof![
        Just(ProductKind::Consumable),
        Just(ProductKind::NonConsumable),
        Just(ProductKind::AutoRenewable),
        Just(ProductKind::NonRenewable),
    ]
}

/// Generate a reasonable ledger timestamp.
pub fn timestamp() -> impl Strategy<Value = i64> {
    0i64..=1_700_000_000_000i64
}

/// Parameters for generating a transaction.
#[derive(Debug, Clone)]
pub struct TransactionParams {
    pub id: u64,
    pub product_id: ProductId,
    pub kind: ProductKind,
    pub purchased_at: i64,
    pub revoked_after: Option<i64>,
}

impl Arbitrary for TransactionParams {
    type Parameters = usize;
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(pool: Self::Parameters) -> Self::Strategy {
        (
            1u64..=10_000u64,
            product_id(if pool == 0 { 8 } else { pool }),
            product_kind(),
            timestamp(),
            proptest::option::of(0i64..=86_400_000i64),
        )
            .prop_map(|(id, product_id, kind, purchased_at, revoked_after)| {
                TransactionParams {
                    id,
                    product_id,
                    kind,
                    purchased_at,
                    revoked_after,
                }
            })
            .boxed()
    }
}

/// Build a transaction from params.
pub fn transaction_from_params(params: &TransactionParams) -> Transaction {
    let tx = TransactionBuilder::new(params.id, params.product_id.clone())
        .kind(params.kind)
        .purchased_at(params.purchased_at)
        .build();
    match params.revoked_after {
        Some(delay) => tx.revoked_at(params.purchased_at + delay),
        None => tx,
    }
}

/// Generate a transaction over a pool of `pool` products.
pub fn transaction(pool: usize) -> impl Strategy<Value = Transaction> {
    any_with::<TransactionParams>(pool).prop_map(|p| transaction_from_params(&p))
}

/// Generate a history of up to `max_len` records over `pool` products.
pub fn history(pool: usize, max_len: usize) -> impl Strategy<Value = Vec<Transaction>> {
    prop::collection::vec(transaction(pool), 0..=max_len)
}

/// Reference model: owned iff the latest record for a product is active.
pub fn expected_owned(records: &[Transaction]) -> BTreeSet<ProductId> {
    let mut latest: HashMap<&ProductId, (RecordVersion, bool)> = HashMap::new();
    for tx in records {
        let candidate = (tx.version(), tx.is_revoked());
        latest
            .entry(&tx.product_id)
            .and_modify(|current| {
                if candidate.0 > current.0 {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    latest
        .into_iter()
        .filter(|(_, (_, revoked))| !revoked)
        .map(|(id, _)| id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iap_kernel_core::{verify, SignedTransaction, VerificationResult};
    use iap_kernel_store::EntitlementStore;

    proptest! {
        #[test]
        fn store_matches_model(records in history(6, 48)) {
            let store = EntitlementStore::new();
            store.reconcile(&records);
            prop_assert_eq!(store.snapshot(), expected_owned(&records));
        }

        #[test]
        fn split_batches_match_single_batch(records in history(4, 32), split in 0usize..32) {
            let split = split.min(records.len());
            let (left, right) = records.split_at(split);

            let batched = EntitlementStore::new();
            batched.reconcile(right);
            batched.reconcile(left);

            prop_assert_eq!(batched.snapshot(), expected_owned(&records));
        }

        #[test]
        fn signed_records_verify_under_their_key(
            params in any_with::<TransactionParams>(4),
            keypair in keypair(),
        ) {
            let tx = transaction_from_params(&params);
            let signed = SignedTransaction::sign(&tx, &keypair).unwrap();
            let envelope = signed.verify(&keypair.public_key()).unwrap();

            prop_assert!(matches!(envelope, VerificationResult::Verified(_)));
            prop_assert_eq!(verify(envelope).unwrap(), tx);
        }
    }
}
