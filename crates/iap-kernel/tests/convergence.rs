//! Concurrent purchases, listener passes and restores converge on the
//! ledger's state.

mod common;

use std::collections::BTreeSet;

use iap_kernel::core::{ProductId, ProductKind};
use iap_kernel::PurchaseStatus;

use common::{eventually, kernel};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activity_converges() -> anyhow::Result<()> {
    let (ledger, kernel) = kernel();
    kernel.initialize().await;

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let kernel = kernel.clone();
        tasks.push(tokio::spawn(async move {
            kernel.purchase(&ProductId::from("premium")).await
        }));
    }
    for i in 0..8 {
        ledger.grant(format!("bonus_{i}"), ProductKind::NonConsumable);
    }
    ledger.grant("sub_monthly", ProductKind::AutoRenewable);
    ledger.revoke("bonus_0");

    for _ in 0..4 {
        let kernel = kernel.clone();
        tasks.push(tokio::spawn(async move {
            let _ = kernel.restore_purchases().await;
            kernel.purchase(&ProductId::from("sub_monthly")).await
        }));
    }

    for task in tasks {
        assert_eq!(task.await?.status, PurchaseStatus::Successful);
    }

    let mut expected: BTreeSet<ProductId> =
        (1..8).map(|i| ProductId::from(format!("bonus_{i}"))).collect();
    expected.insert(ProductId::from("premium"));
    expected.insert(ProductId::from("sub_monthly"));

    let watched = kernel.clone();
    let target = expected.clone();
    eventually(move || watched.owned_products() == target).await?;

    // One more full pass changes nothing.
    let response = kernel.restore_purchases().await;
    assert_eq!(response.owned, expected);

    kernel.shutdown().await;
    Ok(())
}
