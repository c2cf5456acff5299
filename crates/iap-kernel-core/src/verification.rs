//! The verification gate.
//!
//! Classifies a transaction envelope as verified or unverified. Pure,
//! synchronous and free of shared state: the verdict itself comes from the
//! ledger, the gate only unwraps it.

use serde::{Deserialize, Serialize};

use crate::error::{VerificationError, VerificationFailed};
use crate::transaction::Transaction;

/// A transaction wrapped with the ledger's verification verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationResult {
    /// The signature checked out.
    Verified(Transaction),
    /// The signature could not be verified; the payload is still readable.
    Unverified(Transaction, VerificationError),
}

impl VerificationResult {
    /// The wrapped transaction, regardless of verdict.
    pub fn transaction(&self) -> &Transaction {
        match self {
            Self::Verified(tx) | Self::Unverified(tx, _) => tx,
        }
    }

    /// Check if the envelope was verified.
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// The diagnostic, if unverified.
    pub fn error(&self) -> Option<&VerificationError> {
        match self {
            Self::Verified(_) => None,
            Self::Unverified(_, e) => Some(e),
        }
    }

    /// Split into the transaction and the optional diagnostic.
    pub fn into_parts(self) -> (Transaction, Option<VerificationError>) {
        match self {
            Self::Verified(tx) => (tx, None),
            Self::Unverified(tx, e) => (tx, Some(e)),
        }
    }
}

/// Run an envelope through the verification gate.
///
/// Verified envelopes yield their transaction. Unverified envelopes yield a
/// [`VerificationFailed`] carrying the diagnostic for logging.
pub fn verify(envelope: VerificationResult) -> Result<Transaction, VerificationFailed> {
    match envelope {
        VerificationResult::Verified(tx) => Ok(tx),
        VerificationResult::Unverified(tx, reason) => Err(VerificationFailed {
            product_id: tx.product_id,
            transaction_id: tx.id,
            reason,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;
    use crate::types::TransactionId;

    #[test]
    fn test_verified_passes_through() {
        let tx = TransactionBuilder::new(3, "premium").purchased_at(100).build();
        let accepted = verify(VerificationResult::Verified(tx.clone())).unwrap();
        assert_eq!(accepted, tx);
    }

    #[test]
    fn test_unverified_fails_with_context() {
        let tx = TransactionBuilder::new(3, "premium").build();
        let failed = verify(VerificationResult::Unverified(
            tx,
            VerificationError::InvalidSignature,
        ))
        .unwrap_err();

        assert_eq!(failed.product_id.as_str(), "premium");
        assert_eq!(failed.transaction_id, TransactionId::new(3));
        assert_eq!(failed.reason, VerificationError::InvalidSignature);
    }

    #[test]
    fn test_gate_is_deterministic() {
        let envelope = VerificationResult::Unverified(
            TransactionBuilder::new(9, "sub_monthly").build(),
            VerificationError::UnknownSigner,
        );
        assert_eq!(verify(envelope.clone()), verify(envelope));
    }

    #[test]
    fn test_into_parts() {
        let tx = TransactionBuilder::new(1, "premium").build();
        let (inner, err) = VerificationResult::Verified(tx.clone()).into_parts();
        assert_eq!(inner, tx);
        assert!(err.is_none());
    }
}
