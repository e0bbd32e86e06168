//! Broadcast engine: pushes records to matching listeners off the caller's path.

use crate::types::Record;
use crossbeam_channel::{unbounded, Receiver, SendTimeoutError, Sender};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::registry::SubscriptionRegistry;
use super::types::Subscription;

/// Work items for the dispatch worker.
enum Dispatch {
    Deliver {
        record: Arc<Record>,
        listeners: Vec<Arc<Subscription>>,
    },
    /// Acknowledge once everything queued before it has been attempted.
    Flush(Sender<()>),
    Shutdown,
}

/// Delivery counters.
///
/// Kept for logging and tests only; publishers never see drops.
#[derive(Debug, Default)]
pub struct BroadcastStats {
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl BroadcastStats {
    /// Records handed to the engine with at least one matching listener.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Successful enqueues.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Enqueues abandoned after the send timeout.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Fans records out to listeners on a dedicated worker thread.
///
/// A single worker processes broadcasts in publish order, so every listener
/// sees records in the order `broadcast` was called. Within one broadcast the
/// listeners are tried one after another, each with a bounded wait.
pub struct Broadcaster {
    sender: Sender<Dispatch>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<BroadcastStats>,
}

impl Broadcaster {
    /// Spawn the dispatch worker.
    pub fn start(send_timeout: Duration) -> io::Result<Self> {
        let (sender, receiver) = unbounded();
        let stats = Arc::new(BroadcastStats::default());

        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name("event-dispatch".into())
            .spawn(move || run(receiver, send_timeout, worker_stats))?;

        Ok(Self {
            sender,
            worker: Mutex::new(Some(worker)),
            stats,
        })
    }

    /// Queue `record` for every listener matching its type.
    ///
    /// The registry's shared lock is held only while taking the snapshot.
    /// Returns without waiting for any listener.
    pub fn broadcast(&self, registry: &SubscriptionRegistry, record: Arc<Record>) {
        let listeners = registry.lookup(&record.record_type);
        if listeners.is_empty() {
            tracing::trace!(id = %record.id, record_type = %record.record_type, "no listeners");
            return;
        }

        self.stats.published.fetch_add(1, Ordering::Relaxed);
        let listeners = listeners.into_delivery_order();

        if self
            .sender
            .send(Dispatch::Deliver { record, listeners })
            .is_err()
        {
            tracing::debug!("broadcast after shutdown ignored");
        }
    }

    /// Block until every broadcast queued so far has been attempted.
    pub fn flush(&self) {
        let (ack, done) = crossbeam_channel::bounded(1);
        if self.sender.send(Dispatch::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    pub fn stats(&self) -> &BroadcastStats {
        &self.stats
    }

    /// Finish pending broadcasts and stop the worker. Idempotent.
    pub fn shutdown(&self) {
        let Some(worker) = self.worker.lock().take() else {
            return;
        };

        let _ = self.sender.send(Dispatch::Shutdown);
        if worker.join().is_err() {
            tracing::warn!("dispatch worker panicked");
        }
    }
}

impl Drop for Broadcaster {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(receiver: Receiver<Dispatch>, send_timeout: Duration, stats: Arc<BroadcastStats>) {
    for dispatch in receiver.iter() {
        match dispatch {
            Dispatch::Deliver { record, listeners } => {
                deliver(&record, &listeners, send_timeout, &stats);
            }
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
            Dispatch::Shutdown => break,
        }
    }
    tracing::debug!("dispatch worker stopped");
}

/// Try each listener in turn; give up on one after `send_timeout`.
fn deliver(
    record: &Arc<Record>,
    listeners: &[Arc<Subscription>],
    send_timeout: Duration,
    stats: &BroadcastStats,
) {
    for sub in listeners {
        match sub.sender.send_timeout(Arc::clone(record), send_timeout) {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(SendTimeoutError::Timeout(_)) => {
                stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    subscription = %sub.id,
                    id = %record.id,
                    record_type = %record.record_type,
                    "listener queue full, record dropped"
                );
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                // Handle gone; the reaper will unregister it.
                tracing::trace!(subscription = %sub.id, "listener disconnected");
            }
        }
    }
}
