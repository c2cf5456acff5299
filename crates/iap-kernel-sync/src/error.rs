//! Error types for the sync module.

use iap_kernel_core::{CoreError, ProductId};
use thiserror::Error;

/// Errors reported by the remote store services (ledger and catalog).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The store could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The platform purchase machinery failed.
    #[error("system error: {0}")]
    System(String),

    /// The store refused to sell the product.
    #[error("product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// The live update subscription is no longer open.
    #[error("update subscription closed")]
    SubscriptionClosed,

    /// Anything the store reports that fits no other variant.
    #[error("ledger error: {0}")]
    Unknown(String),
}

impl LedgerError {
    /// Whether this is a connectivity failure.
    pub fn is_network(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }

    /// Whether this is a platform failure.
    pub fn is_system(&self) -> bool {
        matches!(self, LedgerError::System(_))
    }
}

impl From<CoreError> for LedgerError {
    fn from(e: CoreError) -> Self {
        LedgerError::Unknown(e.to_string())
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, LedgerError>;
