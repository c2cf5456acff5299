//! Test fixtures and helpers.
//!
//! A store front with one product of each common kind, served by an
//! in-memory ledger and catalog.

use std::sync::Arc;

use iap_kernel::{Kernel, KernelConfig};
use iap_kernel_core::{Keypair, ProductDescriptor, ProductId, ProductKind};
use iap_kernel_sync::{MemoryCatalog, MemoryLedger};

/// The fixture store front.
pub fn products() -> Vec<ProductDescriptor> {
    vec![
        ProductDescriptor::new("coins_100", "100 Coins", "$0.99", ProductKind::Consumable)
            .with_description("A pouch of coins"),
        ProductDescriptor::new("premium", "Premium", "$4.99", ProductKind::NonConsumable)
            .with_description("Unlocks every level"),
        ProductDescriptor::new("sub_monthly", "Monthly Pass", "$2.99", ProductKind::AutoRenewable)
            .with_description("Renews every month"),
    ]
}

/// The fixture store front as JSON, the shape a host would ship.
pub fn catalog_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&products())
}

/// A ledger and catalog wired into a kernel.
pub struct TestFixture {
    pub ledger: Arc<MemoryLedger>,
    pub catalog: Arc<MemoryCatalog>,
}

impl TestFixture {
    /// Create a fixture with a random ledger key.
    pub fn new() -> Self {
        Self::with_keypair(Keypair::generate())
    }

    /// Create with a deterministic ledger key from seed.
    pub fn with_seed(seed: [u8; 32]) -> Self {
        Self::with_keypair(Keypair::from_seed(&seed))
    }

    fn with_keypair(keypair: Keypair) -> Self {
        let catalog = products()
            .into_iter()
            .fold(MemoryCatalog::new(), MemoryCatalog::with_product);
        Self {
            ledger: MemoryLedger::with_keypair(keypair),
            catalog: Arc::new(catalog),
        }
    }

    /// Identifiers of every fixture product.
    pub fn catalog_ids(&self) -> Vec<ProductId> {
        products().into_iter().map(|p| p.id).collect()
    }

    /// Build a kernel over this fixture's ledger and catalog.
    pub fn kernel(&self, config: KernelConfig) -> Kernel<MemoryLedger, MemoryCatalog> {
        Kernel::new(Arc::clone(&self.ledger), Arc::clone(&self.catalog), config)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
