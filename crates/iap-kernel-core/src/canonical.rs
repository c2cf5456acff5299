//! Canonical CBOR encoding of transaction payloads.
//!
//! A transaction is encoded as a CBOR map with small integer keys written in
//! ascending order, smallest-width integers and definite lengths. The same
//! transaction always produces the same bytes, which is what the ledger
//! signs.

use ciborium::value::{Integer, Value};

use crate::error::CoreError;
use crate::product::ProductKind;
use crate::transaction::Transaction;
use crate::types::{ProductId, TransactionId};

/// Current payload format version.
pub const TRANSACTION_FORMAT_VERSION: u8 = 1;

/// Payload field keys (integer keys for compact encoding).
///
/// Keys 0-23 encode as single bytes in CBOR.
mod keys {
    pub const VERSION: u64 = 0;
    pub const ID: u64 = 1;
    pub const ORIGINAL_ID: u64 = 2;
    pub const PRODUCT_ID: u64 = 3;
    pub const PRODUCT_KIND: u64 = 4;
    pub const PURCHASE_DATE: u64 = 5;
    pub const SIGNED_DATE: u64 = 6;
    pub const REVOCATION_DATE: u64 = 7;
    pub const QUANTITY: u64 = 8;
}

/// Encode a transaction to canonical CBOR bytes.
pub fn encode_transaction(tx: &Transaction) -> Result<Vec<u8>, CoreError> {
    let revocation = match tx.revocation_date {
        Some(at) => Value::Integer(at.into()),
        None => Value::Null,
    };

    // Entries are pushed in key order; the map is written as-is.
    let entries = vec![
        (key(keys::VERSION), Value::Integer(TRANSACTION_FORMAT_VERSION.into())),
        (key(keys::ID), Value::Integer(tx.id.get().into())),
        (key(keys::ORIGINAL_ID), Value::Integer(tx.original_id.get().into())),
        (key(keys::PRODUCT_ID), Value::Text(tx.product_id.as_str().to_string())),
        (key(keys::PRODUCT_KIND), Value::Integer(tx.product_kind.to_u8().into())),
        (key(keys::PURCHASE_DATE), Value::Integer(tx.purchase_date.into())),
        (key(keys::SIGNED_DATE), Value::Integer(tx.signed_date.into())),
        (key(keys::REVOCATION_DATE), revocation),
        (key(keys::QUANTITY), Value::Integer(tx.quantity.into())),
    ];

    let mut buf = Vec::new();
    ciborium::into_writer(&Value::Map(entries), &mut buf)
        .map_err(|e| CoreError::EncodingError(e.to_string()))?;
    Ok(buf)
}

/// Decode a transaction from canonical CBOR bytes.
pub fn decode_transaction(bytes: &[u8]) -> Result<Transaction, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;

    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::MalformedTransaction("expected map".into())),
    };

    let get = |k: u64| -> Option<&Value> {
        map.iter()
            .find(|(entry_key, _)| matches!(entry_key, Value::Integer(i) if i128::from(*i) == i128::from(k)))
            .map(|(_, v)| v)
    };

    let version: u8 = required_int(get(keys::VERSION), "version")?;
    if version != TRANSACTION_FORMAT_VERSION {
        return Err(CoreError::UnsupportedVersion(version));
    }

    let product_id = match get(keys::PRODUCT_ID) {
        Some(Value::Text(s)) => ProductId::new(s.clone()),
        Some(_) => return Err(CoreError::MalformedTransaction("product_id must be text".into())),
        None => return Err(CoreError::MissingField("product_id")),
    };

    let revocation_date = match get(keys::REVOCATION_DATE) {
        None | Some(Value::Null) => None,
        Some(v) => Some(int_value(v, "revocation_date")?),
    };

    Ok(Transaction {
        id: TransactionId::new(required_int(get(keys::ID), "id")?),
        original_id: TransactionId::new(required_int(get(keys::ORIGINAL_ID), "original_id")?),
        product_id,
        product_kind: ProductKind::from_u8(required_int(get(keys::PRODUCT_KIND), "product_kind")?),
        purchase_date: required_int(get(keys::PURCHASE_DATE), "purchase_date")?,
        signed_date: required_int(get(keys::SIGNED_DATE), "signed_date")?,
        revocation_date,
        quantity: required_int(get(keys::QUANTITY), "quantity")?,
    })
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

fn required_int<T>(value: Option<&Value>, field: &'static str) -> Result<T, CoreError>
where
    T: TryFrom<Integer>,
{
    match value {
        Some(v) => int_value(v, field),
        None => Err(CoreError::MissingField(field)),
    }
}

fn int_value<T>(value: &Value, field: &'static str) -> Result<T, CoreError>
where
    T: TryFrom<Integer>,
{
    match value {
        Value::Integer(i) => T::try_from(*i)
            .map_err(|_| CoreError::MalformedTransaction(format!("{field} out of range"))),
        _ => Err(CoreError::MalformedTransaction(format!("{field} must be an integer"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionBuilder;

    fn sample() -> Transaction {
        TransactionBuilder::new(42, "sub_monthly")
            .kind(ProductKind::AutoRenewable)
            .original(40)
            .purchased_at(1_736_870_400_000)
            .signed_at(1_736_870_400_500)
            .build()
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let tx = sample();
        assert_eq!(encode_transaction(&tx).unwrap(), encode_transaction(&tx).unwrap());
    }

    #[test]
    fn test_decode_restores_revocation() {
        let tx = sample().revoked_at(1_736_870_500_000);
        let bytes = encode_transaction(&tx).unwrap();
        let decoded = decode_transaction(&bytes).unwrap();
        assert_eq!(decoded, tx);
        assert!(decoded.is_revoked());
    }

    #[test]
    fn test_starts_with_map_header() {
        let bytes = encode_transaction(&sample()).unwrap();
        // Major type 5 (map) with 9 entries.
        assert_eq!(bytes[0], 0xa9);
    }

    #[test]
    fn test_missing_field_reported() {
        let entries = vec![
            (key(keys::VERSION), Value::Integer(TRANSACTION_FORMAT_VERSION.into())),
            (key(keys::ID), Value::Integer(1u64.into())),
            (key(keys::PRODUCT_ID), Value::Text("premium".into())),
        ];
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Map(entries), &mut buf).unwrap();

        match decode_transaction(&buf) {
            Err(CoreError::MissingField(field)) => assert_eq!(field, "original_id"),
            other => panic!("expected missing field, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let entries = vec![(key(keys::VERSION), Value::Integer(9u8.into()))];
        let mut buf = Vec::new();
        ciborium::into_writer(&Value::Map(entries), &mut buf).unwrap();

        assert!(matches!(
            decode_transaction(&buf),
            Err(CoreError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_garbage_is_decoding_error() {
        assert!(matches!(
            decode_transaction(&[0xff, 0x00, 0x13]),
            Err(CoreError::DecodingError(_)) | Err(CoreError::MalformedTransaction(_))
        ));
    }
}
