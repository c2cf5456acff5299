//! The transaction update listener.
//!
//! A long-lived background task that consumes the ledger's live update
//! stream and runs a full reconciliation pass for every event. The event
//! payload itself is not applied.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::ledger::{Ledger, UpdateStream};
use crate::reconciler::Reconciler;

/// Configuration for the listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Run one pass as soon as the subscription is open, picking up events
    /// that happened before it existed.
    pub reconcile_on_start: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            reconcile_on_start: false,
        }
    }
}

/// Counters reported when the listener task exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Updates received from the stream.
    pub events: u64,
    /// Reconciliation passes that completed.
    pub passes: u64,
    /// Reconciliation passes that failed.
    pub failed_passes: u64,
}

/// Starts listener tasks over a reconciler.
pub struct TransactionListener<L: ?Sized> {
    reconciler: Reconciler<L>,
    config: ListenerConfig,
}

impl<L: Ledger + ?Sized + 'static> TransactionListener<L> {
    /// Create a listener.
    pub fn new(reconciler: Reconciler<L>, config: ListenerConfig) -> Self {
        Self { reconciler, config }
    }

    /// Open a fresh subscription and spawn the listener task.
    ///
    /// Must be called from within a tokio runtime. The subscription is open
    /// when this returns.
    pub async fn start(&self) -> Result<ListenerHandle> {
        let updates = self.reconciler.ledger().subscribe().await?;
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(run(
            self.reconciler.clone(),
            updates,
            cancel_rx,
            self.config.reconcile_on_start,
        ));

        tracing::info!("transaction listener started");

        Ok(ListenerHandle {
            cancel: cancel_tx,
            task: Some(task),
        })
    }
}

/// Handle to a running listener task.
///
/// Dropping the handle cancels the listener.
#[derive(Debug)]
pub struct ListenerHandle {
    cancel: watch::Sender<bool>,
    task: Option<JoinHandle<ListenerStats>>,
}

impl ListenerHandle {
    /// Stop consuming the stream and close the subscription.
    ///
    /// Idempotent and non-blocking. A pass already in flight runs to
    /// completion.
    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!("transaction listener cancellation requested");
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Whether the task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the task to exit and return its counters.
    ///
    /// Does not cancel; call [`cancel`](Self::cancel) first to stop a live
    /// subscription. Returns `None` if the task panicked.
    pub async fn join(mut self) -> Option<ListenerStats> {
        let task = self.task.take()?;
        match task.await {
            Ok(stats) => Some(stats),
            Err(e) => {
                tracing::warn!(error = %e, "transaction listener task failed");
                None
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}

async fn run<L: Ledger + ?Sized>(
    reconciler: Reconciler<L>,
    mut updates: UpdateStream,
    mut cancel: watch::Receiver<bool>,
    reconcile_on_start: bool,
) -> ListenerStats {
    let mut stats = ListenerStats::default();

    if reconcile_on_start && !*cancel.borrow() {
        pass(&reconciler, &mut stats).await;
    }

    loop {
        if *cancel.borrow() {
            break;
        }

        tokio::select! {
            biased;

            changed = cancel.changed() => {
                // A dropped sender counts as cancellation.
                if changed.is_err() || *cancel.borrow() {
                    break;
                }
            }
            update = updates.next() => match update {
                Some(envelope) => {
                    stats.events += 1;
                    let tx = envelope.transaction();
                    tracing::debug!(
                        product_id = %tx.product_id,
                        transaction_id = %tx.id,
                        verified = envelope.is_verified(),
                        "transaction update received"
                    );
                    pass(&reconciler, &mut stats).await;
                }
                None => {
                    tracing::info!("transaction update stream ended");
                    break;
                }
            },
        }
    }

    updates.close();
    tracing::info!(
        events = stats.events,
        passes = stats.passes,
        failed_passes = stats.failed_passes,
        "transaction listener stopped"
    );
    stats
}

async fn pass<L: Ledger + ?Sized>(reconciler: &Reconciler<L>, stats: &mut ListenerStats) {
    match reconciler.reconcile().await {
        Ok(_) => stats.passes += 1,
        Err(e) => {
            stats.failed_passes += 1;
            tracing::warn!(error = %e, "reconciliation after update failed");
        }
    }
}
