//! Error types for the IAP Kernel Core.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ProductId, TransactionId};

/// Core errors that can occur while encoding, decoding or signing records.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("unsupported transaction format version: {0}")]
    UnsupportedVersion(u8),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Diagnostic attached to a transaction the ledger could not verify.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum VerificationError {
    #[error("signature verification failed")]
    InvalidSignature,

    #[error("signed by an unknown key")]
    UnknownSigner,

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("missing required properties: {0}")]
    MissingRequiredProperties(String),
}

impl From<CoreError> for VerificationError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::InvalidSignature => VerificationError::InvalidSignature,
            CoreError::InvalidPublicKey => VerificationError::UnknownSigner,
            CoreError::MissingField(field) => {
                VerificationError::MissingRequiredProperties(field.to_string())
            }
            CoreError::UnsupportedVersion(v) => {
                VerificationError::InvalidEncoding(format!("unsupported version {v}"))
            }
            CoreError::MalformedTransaction(msg)
            | CoreError::EncodingError(msg)
            | CoreError::DecodingError(msg) => VerificationError::InvalidEncoding(msg),
        }
    }
}

/// The verification gate rejected a transaction.
///
/// Carries enough context to log the rejection; callers only act on the
/// fact that it failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transaction {transaction_id} for {product_id} failed verification: {reason}")]
pub struct VerificationFailed {
    pub product_id: ProductId,
    pub transaction_id: TransactionId,
    pub reason: VerificationError,
}
