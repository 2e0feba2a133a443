//! Write-retry layer over the ledger.
//!
//! A paying client must never be denied because the audit store hiccuped:
//! when an append fails, the entry is queued and a background task retries
//! it with exponential backoff until it lands. The queue is a single
//! writer; a persistently failing write blocks the entries behind it
//! rather than dropping any of them.
//!
//! Claims are the delicate case. While the store is down the spent-proof
//! set cannot be consulted, so a grant served during an outage is granted
//! on the strength of the verification alone and its claim is queued. If
//! the queued claim later loses the proof race, the double grant is loud
//! in the logs but the response has long been sent.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tollgate::error::StoreError;
use tollgate::ledger::{ClaimOutcome, Ledger, LedgerEntry, LedgerPage, LedgerQuery, NewLedgerEntry};

/// First retry delay after a failed write.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Ceiling for the exponential retry backoff.
const RETRY_MAX_DELAY: Duration = Duration::from_secs(30);

/// How an entry reached durability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DurableOutcome {
    /// Written synchronously; the stored entry is returned.
    Written(LedgerEntry),
    /// The store was unavailable; the entry is queued for background
    /// retry.
    Queued,
}

/// Outcome of a durable claim-and-append.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ClaimDecision {
    /// The proof was fresh (or the claim is queued); access is granted.
    Granted(DurableOutcome),
    /// The proof was already spent by an earlier grant.
    Replayed,
}

enum QueuedWrite {
    Append(NewLedgerEntry),
    Claim { tx_ref: String, entry: NewLedgerEntry },
}

/// Ledger wrapper that queues failed writes instead of losing them.
pub struct RetryingLedger {
    inner: Arc<dyn Ledger>,
    queue: mpsc::UnboundedSender<QueuedWrite>,
    depth: Arc<AtomicUsize>,
}

impl RetryingLedger {
    /// Wraps `inner` and spawns the background retry task.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(inner: Arc<dyn Ledger>) -> Self {
        let (queue, rx) = mpsc::unbounded_channel();
        let depth = Arc::new(AtomicUsize::new(0));
        tokio::spawn(drain_queue(Arc::clone(&inner), rx, Arc::clone(&depth)));
        Self {
            inner,
            queue,
            depth,
        }
    }

    /// Appends an entry, queueing it for retry when the store is down.
    pub async fn append_durable(&self, entry: NewLedgerEntry) -> DurableOutcome {
        match self.inner.append(entry.clone()).await {
            Ok(written) => DurableOutcome::Written(written),
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    correlation = %entry.correlation_id,
                    "ledger append failed, queueing entry for retry"
                );
                self.enqueue(QueuedWrite::Append(entry));
                DurableOutcome::Queued
            }
        }
    }

    /// Claims a payment proof and appends the grant entry.
    ///
    /// A store outage does not deny the paying client: the claim is
    /// queued and the grant stands.
    pub async fn claim_durable(&self, tx_ref: &str, entry: NewLedgerEntry) -> ClaimDecision {
        match self.inner.claim_and_append(tx_ref, entry.clone()).await {
            Ok(ClaimOutcome::Claimed(written)) => {
                ClaimDecision::Granted(DurableOutcome::Written(written))
            }
            Ok(ClaimOutcome::AlreadySpent) => ClaimDecision::Replayed,
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    tx_ref = %tx_ref,
                    correlation = %entry.correlation_id,
                    "proof claim failed, queueing grant entry for retry"
                );
                self.enqueue(QueuedWrite::Claim {
                    tx_ref: tx_ref.to_owned(),
                    entry,
                });
                ClaimDecision::Granted(DurableOutcome::Queued)
            }
        }
    }

    /// Reads a filtered page of entries, newest first.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; reads are not queued.
    pub async fn query(&self, query: LedgerQuery) -> Result<LedgerPage, StoreError> {
        self.inner.query(query).await
    }

    /// Reads every entry for a request correlation id.
    ///
    /// # Errors
    ///
    /// Propagates the store failure; reads are not queued.
    pub async fn find_by_correlation(
        &self,
        correlation_id: &str,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        self.inner.find_by_correlation(correlation_id).await
    }

    /// Number of writes waiting in the retry queue.
    #[must_use]
    pub fn queued_depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    fn enqueue(&self, write: QueuedWrite) {
        self.depth.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(write).is_err() {
            self.depth.fetch_sub(1, Ordering::SeqCst);
            tracing::error!("ledger retry task is gone; a decision entry was lost");
        }
    }
}

impl std::fmt::Debug for RetryingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryingLedger")
            .field("queued_depth", &self.queued_depth())
            .finish_non_exhaustive()
    }
}

async fn drain_queue(
    inner: Arc<dyn Ledger>,
    mut rx: mpsc::UnboundedReceiver<QueuedWrite>,
    depth: Arc<AtomicUsize>,
) {
    while let Some(write) = rx.recv().await {
        let mut delay = RETRY_BASE_DELAY;
        loop {
            // The synchronous attempt just failed; give the store a beat
            // before the first retry.
            tokio::time::sleep(delay).await;
            match attempt(inner.as_ref(), &write).await {
                Ok(()) => {
                    depth.fetch_sub(1, Ordering::SeqCst);
                    break;
                }
                Err(err) => {
                    tracing::warn!(error = %err, retry_in = ?delay, "queued ledger write still failing");
                    delay = (delay * 2).min(RETRY_MAX_DELAY);
                }
            }
        }
    }
}

async fn attempt(inner: &dyn Ledger, write: &QueuedWrite) -> Result<(), StoreError> {
    match write {
        QueuedWrite::Append(entry) => inner.append(entry.clone()).await.map(|_| ()),
        QueuedWrite::Claim { tx_ref, entry } => {
            match inner.claim_and_append(tx_ref, entry.clone()).await? {
                ClaimOutcome::Claimed(_) => Ok(()),
                ClaimOutcome::AlreadySpent => {
                    // The grant was already served; all that is left is to
                    // make the double spend visible to the operator.
                    tracing::error!(
                        tx_ref = %tx_ref,
                        correlation = %entry.correlation_id,
                        "queued grant lost the proof race: payment was double-granted during the outage"
                    );
                    Ok(())
                }
            }
        }
    }
}
