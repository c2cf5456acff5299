//! Transaction: one ledger entry for a purchase, renewal or revocation.
//!
//! A transaction is immutable. A revocation is reported by the ledger as a
//! re-signed copy of the original transaction carrying a revocation date.

use serde::{Deserialize, Serialize};

use crate::crypto::Keypair;
use crate::error::CoreError;
use crate::product::ProductKind;
use crate::signed::SignedTransaction;
use crate::types::{ProductId, TransactionId};

/// A ledger transaction record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Ledger-assigned identifier.
    pub id: TransactionId,

    /// Identifier of the first purchase in a renewal chain (equal to `id`
    /// for one-off purchases).
    pub original_id: TransactionId,

    /// The product this transaction entitles.
    pub product_id: ProductId,

    /// The product kind at purchase time.
    pub product_kind: ProductKind,

    /// When the purchase happened (Unix milliseconds).
    pub purchase_date: i64,

    /// When the ledger signed this copy of the record (Unix milliseconds).
    pub signed_date: i64,

    /// When the entitlement was revoked; `None` while active.
    pub revocation_date: Option<i64>,

    /// Number of units bought.
    pub quantity: u32,
}

/// Total order of records for one product.
///
/// Later signed records win. A revoked copy beats an active copy signed at
/// the same instant, and the transaction id breaks remaining ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordVersion {
    pub signed_date: i64,
    pub revoked: bool,
    pub transaction_id: TransactionId,
}

impl Transaction {
    /// Whether the entitlement has been revoked.
    pub fn is_revoked(&self) -> bool {
        self.revocation_date.is_some()
    }

    /// The ordering key used when merging records for the same product.
    pub fn version(&self) -> RecordVersion {
        RecordVersion {
            signed_date: self.signed_date,
            revoked: self.is_revoked(),
            transaction_id: self.id,
        }
    }

    /// Return a copy revoked at `at`, re-signed at the same instant.
    pub fn revoked_at(&self, at: i64) -> Self {
        Self {
            revocation_date: Some(at),
            signed_date: at.max(self.signed_date),
            ..self.clone()
        }
    }
}

/// Builder for creating transactions.
pub struct TransactionBuilder {
    id: TransactionId,
    original_id: Option<TransactionId>,
    product_id: ProductId,
    product_kind: ProductKind,
    purchase_date: i64,
    signed_date: Option<i64>,
    revocation_date: Option<i64>,
    quantity: u32,
}

impl TransactionBuilder {
    /// Start a builder for a non-consumable purchase of `product_id`.
    pub fn new(id: impl Into<TransactionId>, product_id: impl Into<ProductId>) -> Self {
        Self {
            id: id.into(),
            original_id: None,
            product_id: product_id.into(),
            product_kind: ProductKind::NonConsumable,
            purchase_date: 0,
            signed_date: None,
            revocation_date: None,
            quantity: 1,
        }
    }

    /// Set the product kind.
    pub fn kind(mut self, kind: ProductKind) -> Self {
        self.product_kind = kind;
        self
    }

    /// Set the original transaction id.
    pub fn original(mut self, original_id: impl Into<TransactionId>) -> Self {
        self.original_id = Some(original_id.into());
        self
    }

    /// Set the purchase date. Also the signed date unless set explicitly.
    pub fn purchased_at(mut self, at: i64) -> Self {
        self.purchase_date = at;
        self
    }

    /// Set the signed date.
    pub fn signed_at(mut self, at: i64) -> Self {
        self.signed_date = Some(at);
        self
    }

    /// Mark as revoked at `at`.
    pub fn revoked_at(mut self, at: i64) -> Self {
        self.revocation_date = Some(at);
        self
    }

    /// Set the quantity.
    pub fn quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Build the transaction.
    pub fn build(self) -> Transaction {
        Transaction {
            id: self.id,
            original_id: self.original_id.unwrap_or(self.id),
            product_id: self.product_id,
            product_kind: self.product_kind,
            purchase_date: self.purchase_date,
            signed_date: self.signed_date.unwrap_or(self.purchase_date),
            revocation_date: self.revocation_date,
            quantity: self.quantity,
        }
    }

    /// Build and sign the transaction.
    pub fn sign(self, keypair: &Keypair) -> Result<SignedTransaction, CoreError> {
        SignedTransaction::sign(&self.build(), keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let tx = TransactionBuilder::new(7, "premium").purchased_at(1_000).build();
        assert_eq!(tx.original_id, TransactionId::new(7));
        assert_eq!(tx.signed_date, 1_000);
        assert_eq!(tx.product_kind, ProductKind::NonConsumable);
        assert!(!tx.is_revoked());
    }

    #[test]
    fn test_later_signed_record_wins() {
        let active = TransactionBuilder::new(1, "premium").purchased_at(1_000).build();
        let revoked = active.revoked_at(2_000);
        assert!(revoked.version() > active.version());
    }

    #[test]
    fn test_revoked_beats_active_at_same_instant() {
        let active = TransactionBuilder::new(1, "premium").purchased_at(1_000).build();
        let revoked = TransactionBuilder::new(1, "premium")
            .purchased_at(1_000)
            .revoked_at(1_000)
            .build();
        assert!(revoked.version() > active.version());
    }

    #[test]
    fn test_revoked_at_never_moves_signed_date_backwards() {
        let tx = TransactionBuilder::new(1, "premium")
            .purchased_at(1_000)
            .signed_at(5_000)
            .build();
        assert_eq!(tx.revoked_at(2_000).signed_date, 5_000);
    }
}
