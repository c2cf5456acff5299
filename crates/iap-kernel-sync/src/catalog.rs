//! Catalog abstraction: resolves product identifiers to descriptors.

use async_trait::async_trait;

use iap_kernel_core::{ProductDescriptor, ProductId};

use crate::error::Result;

/// Catalog service trait.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Resolve identifiers to descriptors.
    ///
    /// Unknown identifiers are omitted from the result; an empty result for a
    /// single identifier means the product does not exist.
    async fn products(&self, ids: &[ProductId]) -> Result<Vec<ProductDescriptor>>;
}
