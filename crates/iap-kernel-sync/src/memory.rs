//! In-memory ledger and catalog.
//!
//! A reference implementation of the remote store for tests, demos and
//! offline development. The ledger signs its transactions with its own
//! keypair and produces verdicts by checking those signatures, so forged or
//! tampered records surface as unverified envelopes.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use iap_kernel_core::{
    Ed25519PublicKey, Keypair, ProductDescriptor, ProductId, ProductKind, SignedTransaction,
    Transaction, TransactionBuilder, TransactionId, VerificationResult,
};

use crate::catalog::Catalog;
use crate::error::{LedgerError, Result};
use crate::ledger::{Ledger, PurchaseResult, UpdateStream};

/// Default buffer of each update subscription.
pub const DEFAULT_UPDATE_BUFFER: usize = 64;

/// Scripted outcome of a purchase request for one product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PurchaseScript {
    /// Succeeds with a ledger-signed transaction.
    #[default]
    Verified,
    /// Succeeds, but the transaction fails signature verification.
    Unverified,
    /// Waits for external approval; see [`MemoryLedger::approve_pending`].
    Pending,
    /// The user backs out.
    UserCancelled,
    /// The request fails with [`LedgerError::Network`].
    NetworkError,
    /// The request fails with [`LedgerError::System`].
    SystemError,
    /// The request fails with [`LedgerError::Unknown`].
    UnknownError,
}

/// In-memory remote ledger.
pub struct MemoryLedger {
    keypair: Keypair,
    update_buffer: usize,
    state: Mutex<LedgerState>,
    subscribers: Mutex<Vec<mpsc::Sender<VerificationResult>>>,
    clock: AtomicI64,
    next_id: AtomicU64,
}

#[derive(Default)]
struct LedgerState {
    /// Latest signed record per entitlement-bearing product.
    entitlements: BTreeMap<ProductId, SignedTransaction>,

    /// Transactions not yet finished by the client.
    unfinished: BTreeMap<TransactionId, SignedTransaction>,

    /// Finished transaction ids.
    finished: HashSet<TransactionId>,

    /// Records signed by a foreign key.
    forged: Vec<SignedTransaction>,

    /// Purchase outcome per product.
    scripts: HashMap<ProductId, PurchaseScript>,

    /// Purchases awaiting approval.
    pending: BTreeMap<ProductId, ProductKind>,

    snapshot_failure: Option<LedgerError>,
    sync_failure: Option<LedgerError>,

    snapshot_calls: usize,
    sync_calls: usize,
    finish_calls: usize,
    purchase_calls: usize,
}

impl MemoryLedger {
    /// Create a ledger with a random signing key.
    pub fn new() -> Arc<Self> {
        Self::with_keypair(Keypair::generate())
    }

    /// Create a ledger that signs with `keypair`.
    pub fn with_keypair(keypair: Keypair) -> Arc<Self> {
        Arc::new(Self::build(keypair, DEFAULT_UPDATE_BUFFER))
    }

    /// Create a ledger with a custom update buffer per subscription.
    pub fn with_update_buffer(keypair: Keypair, update_buffer: usize) -> Arc<Self> {
        Arc::new(Self::build(keypair, update_buffer))
    }

    fn build(keypair: Keypair, update_buffer: usize) -> Self {
        Self {
            keypair,
            update_buffer: update_buffer.max(1),
            state: Mutex::new(LedgerState::default()),
            subscribers: Mutex::new(Vec::new()),
            clock: AtomicI64::new(now_millis()),
            next_id: AtomicU64::new(1),
        }
    }

    /// The key the ledger signs with.
    pub fn public_key(&self) -> Ed25519PublicKey {
        self.keypair.public_key()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Scripting
    // ─────────────────────────────────────────────────────────────────────────

    /// Set the outcome of future purchases of `product_id`.
    pub fn script_purchase(&self, product_id: impl Into<ProductId>, script: PurchaseScript) {
        self.state().scripts.insert(product_id.into(), script);
    }

    /// Make snapshot requests fail until cleared with `None`.
    pub fn fail_snapshots(&self, failure: Option<LedgerError>) {
        self.state().snapshot_failure = failure;
    }

    /// Make sync requests fail until cleared with `None`.
    pub fn fail_sync(&self, failure: Option<LedgerError>) {
        self.state().sync_failure = failure;
    }

    // ─────────────────────────────────────────────────────────────────────────
    // External events
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a purchase made elsewhere (another device, a promo code) and
    /// announce it on the update stream.
    pub fn grant(&self, product_id: impl Into<ProductId>, kind: ProductKind) -> Transaction {
        let tx = self.new_transaction(product_id.into(), kind);
        if let Some(signed) = self.sign(&tx, &self.keypair) {
            self.record(&tx, signed);
            self.publish(VerificationResult::Verified(tx.clone()));
        }
        tx
    }

    /// Revoke the latest entitlement for `product_id` (refund, family
    /// sharing removal) and announce it. Returns `None` if nothing to revoke.
    pub fn revoke(&self, product_id: impl Into<ProductId>) -> Option<Transaction> {
        let product_id = product_id.into();
        let revoked = {
            let mut state = self.state();
            let current = state.entitlements.get(&product_id)?.decode().ok()?;
            let revoked = current.revoked_at(self.tick());
            let signed = self.sign(&revoked, &self.keypair)?;
            state.entitlements.insert(product_id, signed);
            revoked
        };
        self.publish(VerificationResult::Verified(revoked.clone()));
        Some(revoked)
    }

    /// Approve a pending purchase and announce the resulting transaction.
    pub fn approve_pending(&self, product_id: impl Into<ProductId>) -> Option<Transaction> {
        let product_id = product_id.into();
        let kind = self.state().pending.remove(&product_id)?;
        Some(self.grant(product_id, kind))
    }

    /// Add a record signed by a foreign key and announce it.
    pub fn inject_forged(&self, product_id: impl Into<ProductId>, kind: ProductKind) -> Transaction {
        let tx = self.new_transaction(product_id.into(), kind);
        let Some(forged) = self.sign(&tx, &Keypair::generate()) else {
            return tx;
        };
        let verdict = self.check(&forged);
        self.state().forged.push(forged);
        if let Some(verdict) = verdict {
            self.publish(verdict);
        }
        tx
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Inspection
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether a transaction has been finished.
    pub fn is_finished(&self, id: TransactionId) -> bool {
        self.state().finished.contains(&id)
    }

    /// Ids of transactions not yet finished.
    pub fn unfinished(&self) -> Vec<TransactionId> {
        self.state().unfinished.keys().copied().collect()
    }

    /// Products with a purchase awaiting approval.
    pub fn pending(&self) -> Vec<ProductId> {
        self.state().pending.keys().cloned().collect()
    }

    /// Number of `finish` calls received.
    pub fn finish_count(&self) -> usize {
        self.state().finish_calls
    }

    /// Number of `sync` calls received.
    pub fn sync_count(&self) -> usize {
        self.state().sync_calls
    }

    /// Number of `current_entitlements` calls received.
    pub fn snapshot_count(&self) -> usize {
        self.state().snapshot_calls
    }

    /// Number of `purchase` calls received.
    pub fn purchase_count(&self) -> usize {
        self.state().purchase_calls
    }

    /// Number of open update subscriptions.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers();
        subscribers.retain(|s| !s.is_closed());
        subscribers.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<mpsc::Sender<VerificationResult>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Strictly increasing ledger time.
    fn tick(&self) -> i64 {
        self.clock.fetch_add(1, Ordering::SeqCst)
    }

    fn new_transaction(&self, product_id: ProductId, kind: ProductKind) -> Transaction {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        TransactionBuilder::new(id, product_id)
            .kind(kind)
            .purchased_at(self.tick())
            .build()
    }

    fn record(&self, tx: &Transaction, signed: SignedTransaction) {
        let mut state = self.state();
        if tx.product_kind.is_entitlement() {
            state.entitlements.insert(tx.product_id.clone(), signed.clone());
        }
        state.unfinished.insert(tx.id, signed);
    }

    fn sign(&self, tx: &Transaction, keypair: &Keypair) -> Option<SignedTransaction> {
        match SignedTransaction::sign(tx, keypair) {
            Ok(signed) => Some(signed),
            Err(e) => {
                tracing::error!(transaction_id = %tx.id, error = %e, "failed to sign ledger record");
                None
            }
        }
    }

    fn check(&self, signed: &SignedTransaction) -> Option<VerificationResult> {
        match signed.verify(&self.keypair.public_key()) {
            Ok(verdict) => Some(verdict),
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable ledger record");
                None
            }
        }
    }

    fn publish(&self, update: VerificationResult) {
        let mut subscribers = self.subscribers();
        subscribers.retain(|sender| match sender.try_send(update.clone()) {
            Ok(()) => true,
            // A full buffer already holds an update that will trigger a pass.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => false,
        });
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn current_entitlements(&self) -> Result<Vec<VerificationResult>> {
        let records: Vec<SignedTransaction> = {
            let mut state = self.state();
            state.snapshot_calls += 1;
            if let Some(failure) = state.snapshot_failure.clone() {
                return Err(failure);
            }

            let consumables = state.unfinished.values().filter(|signed| {
                signed
                    .decode()
                    .map(|tx| !tx.product_kind.is_entitlement())
                    .unwrap_or(false)
            });

            state
                .entitlements
                .values()
                .chain(consumables)
                .chain(state.forged.iter())
                .cloned()
                .collect()
        };

        Ok(records.iter().filter_map(|signed| self.check(signed)).collect())
    }

    async fn subscribe(&self) -> Result<UpdateStream> {
        let (sender, stream) = UpdateStream::channel(self.update_buffer);
        self.subscribers().push(sender);
        Ok(stream)
    }

    async fn purchase(&self, product: &ProductDescriptor) -> Result<PurchaseResult> {
        let script = {
            let mut state = self.state();
            state.purchase_calls += 1;
            state.scripts.get(&product.id).copied().unwrap_or_default()
        };

        tracing::debug!(product_id = %product.id, ?script, "memory ledger purchase");

        match script {
            PurchaseScript::Verified => {
                let tx = self.new_transaction(product.id.clone(), product.kind);
                let signed = SignedTransaction::sign(&tx, &self.keypair)?;
                self.record(&tx, signed);
                self.publish(VerificationResult::Verified(tx.clone()));
                Ok(PurchaseResult::Success(VerificationResult::Verified(tx)))
            }
            PurchaseScript::Unverified => {
                let tx = self.new_transaction(product.id.clone(), product.kind);
                let forged = SignedTransaction::sign(&tx, &Keypair::generate())?;
                let verdict = self
                    .check(&forged)
                    .ok_or_else(|| LedgerError::Unknown("undecodable transaction".into()))?;
                self.state().forged.push(forged);
                self.publish(verdict.clone());
                Ok(PurchaseResult::Success(verdict))
            }
            PurchaseScript::Pending => {
                self.state().pending.insert(product.id.clone(), product.kind);
                Ok(PurchaseResult::Pending)
            }
            PurchaseScript::UserCancelled => Ok(PurchaseResult::UserCancelled),
            PurchaseScript::NetworkError => {
                Err(LedgerError::Network("store unreachable".into()))
            }
            PurchaseScript::SystemError => {
                Err(LedgerError::System("purchase service failed".into()))
            }
            PurchaseScript::UnknownError => {
                Err(LedgerError::Unknown("unexpected purchase failure".into()))
            }
        }
    }

    async fn finish(&self, transaction: &Transaction) -> Result<()> {
        let mut state = self.state();
        state.finish_calls += 1;
        state.unfinished.remove(&transaction.id);
        state.finished.insert(transaction.id);
        Ok(())
    }

    async fn sync(&self) -> Result<()> {
        let mut state = self.state();
        state.sync_calls += 1;
        match state.sync_failure.clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }
}

/// In-memory product catalog.
#[derive(Default)]
pub struct MemoryCatalog {
    products: RwLock<HashMap<ProductId, ProductDescriptor>>,
    failure: Mutex<Option<LedgerError>>,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product (builder style).
    pub fn with_product(self, product: ProductDescriptor) -> Self {
        self.insert(product);
        self
    }

    /// Add or replace a product.
    pub fn insert(&self, product: ProductDescriptor) {
        self.products
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(product.id.clone(), product);
    }

    /// Make lookups fail until cleared with `None`.
    pub fn fail_with(&self, failure: Option<LedgerError>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = failure;
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn products(&self, ids: &[ProductId]) -> Result<Vec<ProductDescriptor>> {
        if let Some(failure) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(failure);
        }

        let products = self.products.read().unwrap_or_else(PoisonError::into_inner);
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
