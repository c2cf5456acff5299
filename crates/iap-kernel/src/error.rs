//! Error types for the Kernel, and the stable codes reported to the host.

use iap_kernel_core::{ProductId, VerificationFailed};
use iap_kernel_sync::LedgerError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during Kernel operations.
///
/// Never crosses the host boundary as-is; see [`KernelError::kind`].
#[derive(Debug, Error)]
pub enum KernelError {
    /// Ledger or catalog error.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// A purchase could not be verified and the policy rejects it.
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationFailed),

    /// The catalog does not know the product.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),
}

impl KernelError {
    /// Collapse into the host-facing error vocabulary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::Ledger(LedgerError::Network(_)) => ErrorKind::NetworkError,
            KernelError::Ledger(LedgerError::System(_)) => ErrorKind::SystemError,
            KernelError::Ledger(LedgerError::ProductUnavailable(_)) => ErrorKind::ProductNotFound,
            KernelError::Ledger(LedgerError::SubscriptionClosed)
            | KernelError::Ledger(LedgerError::Unknown(_)) => ErrorKind::Unknown,
            KernelError::Verification(_) => ErrorKind::Unknown,
            KernelError::ProductNotFound(_) => ErrorKind::ProductNotFound,
        }
    }
}

/// Result type for Kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// A numeric code with no matching variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unknown code: {0}")]
pub struct UnknownCode(pub u8);

/// Error kind reported with every host completion.
///
/// The numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ErrorKind {
    #[default]
    None = 0,
    Unknown = 1,
    UserCancelled = 2,
    NetworkError = 3,
    SystemError = 4,
    ProductNotFound = 5,
}

impl ErrorKind {
    /// The stable numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a kind by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ErrorKind::None),
            1 => Some(ErrorKind::Unknown),
            2 => Some(ErrorKind::UserCancelled),
            3 => Some(ErrorKind::NetworkError),
            4 => Some(ErrorKind::SystemError),
            5 => Some(ErrorKind::ProductNotFound),
            _ => None,
        }
    }

    /// Whether this reports a failure.
    pub fn is_error(self) -> bool {
        self != ErrorKind::None
    }
}

impl From<ErrorKind> for u8 {
    fn from(kind: ErrorKind) -> u8 {
        kind.code()
    }
}

impl TryFrom<u8> for ErrorKind {
    type Error = UnknownCode;

    fn try_from(code: u8) -> std::result::Result<Self, UnknownCode> {
        Self::from_code(code).ok_or(UnknownCode(code))
    }
}

/// Status of a purchase completion.
///
/// The numeric codes are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum PurchaseStatus {
    Successful = 0,
    SuccessfulButUnverified = 1,
    PendingAuthorization = 2,
    UserCancelled = 3,
    Error = 4,
}

impl PurchaseStatus {
    /// The stable numeric code.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Look up a status by its numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(PurchaseStatus::Successful),
            1 => Some(PurchaseStatus::SuccessfulButUnverified),
            2 => Some(PurchaseStatus::PendingAuthorization),
            3 => Some(PurchaseStatus::UserCancelled),
            4 => Some(PurchaseStatus::Error),
            _ => None,
        }
    }
}

impl From<PurchaseStatus> for u8 {
    fn from(status: PurchaseStatus) -> u8 {
        status.code()
    }
}

impl TryFrom<u8> for PurchaseStatus {
    type Error = UnknownCode;

    fn try_from(code: u8) -> std::result::Result<Self, UnknownCode> {
        Self::from_code(code).ok_or(UnknownCode(code))
    }
}
