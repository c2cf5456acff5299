//! Product descriptors as resolved by the catalog.

use serde::{Deserialize, Serialize};

use crate::types::ProductId;

/// The kind of product, determining how ownership behaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ProductKind {
    /// Used up once delivered (coins, lives).
    Consumable = 0,
    /// Bought once, owned forever.
    NonConsumable = 1,
    /// Subscription renewed by the store until cancelled.
    AutoRenewable = 2,
    /// Time-limited access that does not renew.
    NonRenewable = 3,
    /// Anything the catalog reports that we do not recognise.
    Unknown = 0xFF,
}

impl ProductKind {
    /// Convert to u8 for serialization.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Parse from u8. Unrecognised values map to [`ProductKind::Unknown`].
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Consumable,
            1 => Self::NonConsumable,
            2 => Self::AutoRenewable,
            3 => Self::NonRenewable,
            _ => Self::Unknown,
        }
    }

    /// Whether ownership persists in the ledger's entitlement snapshot.
    pub fn is_entitlement(self) -> bool {
        matches!(
            self,
            Self::NonConsumable | Self::AutoRenewable | Self::NonRenewable
        )
    }

    /// Check if this is a subscription kind.
    pub fn is_subscription(self) -> bool {
        matches!(self, Self::AutoRenewable | Self::NonRenewable)
    }
}

/// Immutable snapshot of a product's display metadata.
///
/// Fetched on demand from the catalog and never cached by the kernel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDescriptor {
    pub id: ProductId,
    pub display_name: String,
    pub display_price: String,
    pub description: String,
    pub kind: ProductKind,
}

impl ProductDescriptor {
    /// Create a descriptor with empty description.
    pub fn new(
        id: impl Into<ProductId>,
        display_name: impl Into<String>,
        display_price: impl Into<String>,
        kind: ProductKind,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            display_price: display_price.into(),
            description: String::new(),
            kind,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_u8_roundtrip() {
        for kind in [
            ProductKind::Consumable,
            ProductKind::NonConsumable,
            ProductKind::AutoRenewable,
            ProductKind::NonRenewable,
            ProductKind::Unknown,
        ] {
            assert_eq!(ProductKind::from_u8(kind.to_u8()), kind);
        }
        assert_eq!(ProductKind::from_u8(42), ProductKind::Unknown);
    }

    #[test]
    fn test_entitlement_kinds() {
        assert!(!ProductKind::Consumable.is_entitlement());
        assert!(ProductKind::NonConsumable.is_entitlement());
        assert!(ProductKind::AutoRenewable.is_subscription());
        assert!(!ProductKind::Unknown.is_entitlement());
    }

    #[test]
    fn test_descriptor_serde() {
        let product = ProductDescriptor::new("coins_100", "100 Coins", "$0.99", ProductKind::Consumable)
            .with_description("A pile of coins");
        let json = serde_json::to_string(&product).unwrap();
        assert!(json.contains("\"kind\":\"consumable\""));
        let back: ProductDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, product);
    }
}
