//! Shared setup for the kernel integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use iap_kernel::core::{ProductDescriptor, ProductKind};
use iap_kernel::sync::{MemoryCatalog, MemoryLedger};
use iap_kernel::{Kernel, KernelConfig};

pub type TestKernel = Kernel<MemoryLedger, MemoryCatalog>;

/// Route kernel logs to the test harness output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// The store front used throughout the tests.
pub fn catalog() -> MemoryCatalog {
    MemoryCatalog::new()
        .with_product(ProductDescriptor::new(
            "coins_100",
            "100 Coins",
            "$0.99",
            ProductKind::Consumable,
        ))
        .with_product(
            ProductDescriptor::new("premium", "Premium", "$4.99", ProductKind::NonConsumable)
                .with_description("Unlocks every level"),
        )
        .with_product(ProductDescriptor::new(
            "sub_monthly",
            "Monthly Pass",
            "$2.99",
            ProductKind::AutoRenewable,
        ))
}

pub fn kernel_with(config: KernelConfig) -> (Arc<MemoryLedger>, Arc<TestKernel>) {
    init_tracing();
    let ledger = MemoryLedger::new();
    let kernel = Arc::new(Kernel::new(Arc::clone(&ledger), Arc::new(catalog()), config));
    (ledger, kernel)
}

pub fn kernel() -> (Arc<MemoryLedger>, Arc<TestKernel>) {
    kernel_with(KernelConfig::default())
}

/// Poll `check` until it holds, failing after five seconds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> anyhow::Result<()> {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("condition not reached in time"))
}
