//! Kernel configuration.

use iap_kernel_sync::ListenerConfig;
use serde::{Deserialize, Serialize};

/// What to report when the ledger confirms a purchase whose signature does
/// not verify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedPolicy {
    /// Report `SuccessfulButUnverified`.
    #[default]
    Accept,
    /// Report `Error` with kind `Unknown`.
    Reject,
}

/// Configuration for the Kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Handling of unverified purchase confirmations.
    pub unverified_policy: UnverifiedPolicy,
    /// Whether `initialize` starts the transaction update listener.
    pub listen_for_updates: bool,
    /// Listener configuration.
    pub listener: ListenerConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            unverified_policy: UnverifiedPolicy::Accept,
            listen_for_updates: true,
            listener: ListenerConfig::default(),
        }
    }
}
