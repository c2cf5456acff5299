//! # IAP Kernel Core
//!
//! Pure primitives for the IAP Kernel: product identifiers, product
//! descriptors, transaction records, signed transactions and the
//! verification gate.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over purchase records.
//!
//! ## Key Types
//!
//! - [`ProductId`] - Opaque key of a purchasable item
//! - [`ProductDescriptor`] - Display metadata for a product
//! - [`Transaction`] - One ledger entry for a purchase, renewal or revocation
//! - [`SignedTransaction`] - A transaction payload with its ledger signature
//! - [`VerificationResult`] - A transaction wrapped with a verification verdict
//!
//! ## Verification
//!
//! The kernel never decides authenticity itself. The remote ledger hands out
//! [`VerificationResult`] envelopes and [`verify`] turns an envelope into an
//! accepted [`Transaction`] or a [`VerificationFailed`] signal.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod product;
pub mod signed;
pub mod transaction;
pub mod types;
pub mod verification;

pub use canonical::{decode_transaction, encode_transaction};
pub use crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, PayloadDigest};
pub use error::{CoreError, VerificationError, VerificationFailed};
pub use product::{ProductDescriptor, ProductKind};
pub use signed::{SignedTransaction, SIGN_DOMAIN};
pub use transaction::{RecordVersion, Transaction, TransactionBuilder};
pub use types::{ProductId, TransactionId};
pub use verification::{verify, VerificationResult};
