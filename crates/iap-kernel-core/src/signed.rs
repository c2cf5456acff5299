//! Signed transactions: a canonical payload plus the ledger's signature.
//!
//! This is the envelope the remote ledger hands out. Checking it against the
//! ledger's key yields a [`VerificationResult`]; the kernel only ever sees
//! that verdict.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::canonical::{decode_transaction, encode_transaction};
use crate::crypto::{Ed25519PublicKey, Ed25519Signature, Keypair, PayloadDigest};
use crate::error::{CoreError, VerificationError};
use crate::transaction::Transaction;
use crate::verification::VerificationResult;

/// Domain separator mixed into every signed digest.
pub const SIGN_DOMAIN: &[u8] = b"iap-kernel/transaction/v1:";

/// A transaction payload signed by a ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    /// Canonical CBOR encoding of the transaction.
    pub payload: Bytes,

    /// The key that produced the signature.
    pub signer: Ed25519PublicKey,

    /// Ed25519 signature over `Blake3(SIGN_DOMAIN || payload)`.
    pub signature: Ed25519Signature,
}

impl SignedTransaction {
    /// Encode and sign a transaction.
    pub fn sign(tx: &Transaction, keypair: &Keypair) -> Result<Self, CoreError> {
        let payload = encode_transaction(tx)?;
        Ok(Self::sign_payload(payload.into(), keypair))
    }

    /// Sign raw payload bytes.
    pub fn sign_payload(payload: Bytes, keypair: &Keypair) -> Self {
        let digest = signing_digest(&payload);
        Self {
            signature: keypair.sign(&digest),
            signer: keypair.public_key(),
            payload,
        }
    }

    /// Decode the payload without checking the signature.
    pub fn decode(&self) -> Result<Transaction, CoreError> {
        decode_transaction(&self.payload)
    }

    /// Check the signature against the trusted ledger key.
    ///
    /// Returns `Err` only when the payload cannot be decoded at all; every
    /// decodable payload yields a verdict.
    pub fn verify(&self, trusted: &Ed25519PublicKey) -> Result<VerificationResult, CoreError> {
        let tx = self.decode()?;

        if &self.signer != trusted {
            return Ok(VerificationResult::Unverified(tx, VerificationError::UnknownSigner));
        }

        let digest = signing_digest(&self.payload);
        match trusted.verify(&digest, &self.signature) {
            Ok(()) => Ok(VerificationResult::Verified(tx)),
            Err(e) => Ok(VerificationResult::Unverified(tx, e.into())),
        }
    }
}

fn signing_digest(payload: &[u8]) -> PayloadDigest {
    PayloadDigest::of(SIGN_DOMAIN, payload)
}
