//! # Subscriber Registry
//!
//! Owns the set of live subscribers. Connection tasks register after their
//! handshake completes and receive a bounded queue; the broadcast loop pushes
//! one shared, already-serialized frame into every queue.
//!
//! ## Fan-out rules:
//! - A broadcast works on a snapshot of the set, so connections may come and
//!   go while it runs.
//! - A closed queue means the connection is gone. It is removed after the
//!   pass, and the remaining subscribers are still served.
//! - A full queue means the subscriber is slow. It misses this frame only.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// A serialized JSON payload shared by every recipient of one broadcast.
///
/// Clones share one reference-counted buffer.
pub type Frame = Bytes;

/// Frames a subscriber may have queued before new ones are dropped.
pub const DEFAULT_QUEUE_DEPTH: usize = 4;

/// The receiving side handed to a connection on `register`.
#[derive(Debug)]
pub struct Subscription {
    /// Registry-assigned id, used to unregister.
    pub id: u64,
    /// Frames to forward to the connection.
    pub receiver: mpsc::Receiver<Frame>,
}

/// What happened during one broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers that received the frame.
    pub delivered: usize,
    /// Subscribers that skipped the frame because their queue was full.
    pub dropped: usize,
    /// Subscribers removed because their queue had closed.
    pub removed: usize,
}

/// # Subscriber Registry
///
/// Mutex-guarded map from subscriber id to queue sender.
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    queue_depth: usize,
    subscribers: Mutex<HashMap<u64, mpsc::Sender<Frame>>>,
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_DEPTH)
    }
}

impl SubscriberRegistry {
    /// Creates an empty registry whose queues hold `queue_depth` frames.
    pub fn new(queue_depth: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a subscriber and returns its queue.
    pub fn register(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_depth);

        let total = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.insert(id, tx);
            subscribers.len()
        };
        info!(subscriber = id, total, "Subscriber registered");

        Subscription { id, receiver: rx }
    }

    /// Removes a subscriber. Returns `false` if it was already gone.
    pub fn unregister(&self, id: u64) -> bool {
        let (removed, total) = {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            let removed = subscribers.remove(&id).is_some();
            (removed, subscribers.len())
        };
        if removed {
            info!(subscriber = id, total, "Subscriber unregistered");
        }
        removed
    }

    /// Number of live subscribers.
    pub fn count(&self) -> usize {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// # Broadcast
    ///
    /// Pushes `frame` to every subscriber without waiting on any of them.
    /// Each queue receives a clone of the shared buffer, never a copy of the text.
    pub fn broadcast(&self, frame: Frame) -> BroadcastReport {
        // --- Phase 1: Snapshot ---
        let snapshot: Vec<(u64, mpsc::Sender<Frame>)> = {
            let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            subscribers.iter().map(|(id, tx)| (*id, tx.clone())).collect()
        };

        // --- Phase 2: Deliver ---
        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();
        for (id, tx) in snapshot {
            match tx.try_send(frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(subscriber = id, "Subscriber queue full, frame dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(id),
            }
        }

        // --- Phase 3: Prune ---
        if !closed.is_empty() {
            let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
            for id in &closed {
                if subscribers.remove(id).is_some() {
                    report.removed += 1;
                    debug!(subscriber = *id, "Removed closed subscriber");
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(text: &str) -> Frame {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn test_register_then_unregister_restores_count() {
        let registry = SubscriberRegistry::default();
        let before = registry.count();

        let sub = registry.register();
        assert_eq!(registry.count(), before + 1);

        assert!(registry.unregister(sub.id));
        assert_eq!(registry.count(), before);
        assert!(!registry.unregister(sub.id));
    }

    #[test]
    fn test_broadcast_to_empty_registry_is_noop() {
        let registry = SubscriberRegistry::default();
        assert_eq!(registry.broadcast(frame("{}")), BroadcastReport::default());
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_every_subscriber_gets_the_same_frame() {
        let registry = SubscriberRegistry::default();
        let mut a = registry.register();
        let mut b = registry.register();

        let sent = frame(r#"{"timestamp":1.0}"#);
        let report = registry.broadcast(sent.clone());
        assert_eq!(report.delivered, 2);

        let got_a = a.receiver.try_recv().unwrap();
        let got_b = b.receiver.try_recv().unwrap();
        assert_eq!(got_a.as_ptr(), sent.as_ptr());
        assert_eq!(got_b.as_ptr(), sent.as_ptr());
    }

    #[test]
    fn test_closed_subscriber_is_removed_and_others_still_served() {
        let registry = SubscriberRegistry::default();
        let dead = registry.register();
        let mut alive = registry.register();
        drop(dead.receiver);

        let report = registry.broadcast(frame("x"));
        assert_eq!(report, BroadcastReport { delivered: 1, dropped: 0, removed: 1 });
        assert_eq!(registry.count(), 1);
        assert_eq!(alive.receiver.try_recv().unwrap(), "x");
    }

    #[test]
    fn test_full_queue_drops_frame_but_keeps_subscriber() {
        let registry = SubscriberRegistry::new(1);
        let mut slow = registry.register();

        registry.broadcast(frame("first"));
        let report = registry.broadcast(frame("second"));
        assert_eq!(report.dropped, 1);
        assert_eq!(registry.count(), 1);

        assert_eq!(slow.receiver.try_recv().unwrap(), "first");
        assert!(slow.receiver.try_recv().is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        let registry = SubscriberRegistry::default();
        let a = registry.register();
        let b = registry.register();
        assert_ne!(a.id, b.id);
    }
}
