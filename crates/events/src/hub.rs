//! Per-fingerprint subscriber registry.
//!
//! Every subscriber owns an unbounded channel, so [`NotificationHub::broadcast`]
//! never waits on a slow observer. A send only fails when the observer's
//! receiver is gone; such subscribers are reaped right after the broadcast.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use mediaflow_core::job_events::ProgressEvent;
use mediaflow_core::types::{Fingerprint, Timestamp};
use tokio::sync::{mpsc, RwLock};

// ---------------------------------------------------------------------------
// Messages and handles
// ---------------------------------------------------------------------------

/// What a subscriber receives from the hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubMessage {
    /// A progress event for the subscribed fingerprint.
    Event(ProgressEvent),
    /// The group was closed; no further messages follow.
    Close,
}

/// Identifies one registration inside the hub.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberHandle {
    pub fingerprint: Fingerprint,
    pub id: u64,
}

/// A live registration: the handle plus the receiving half of its channel.
#[derive(Debug)]
pub struct Subscription {
    pub handle: SubscriberHandle,
    pub receiver: mpsc::UnboundedReceiver<HubMessage>,
}

impl Subscription {
    /// Wait for the next message. `None` once the hub dropped the sender.
    pub async fn recv(&mut self) -> Option<HubMessage> {
        self.receiver.recv().await
    }
}

struct Subscriber {
    id: u64,
    sender: mpsc::UnboundedSender<HubMessage>,
    /// When this subscriber joined; reported in debug logs on removal.
    joined_at: Timestamp,
}

// ---------------------------------------------------------------------------
// NotificationHub
// ---------------------------------------------------------------------------

/// Keyed registry of live observers.
///
/// Thread-safe via interior `RwLock`. Broadcasts take the read lock, so
/// concurrent broadcasts for different fingerprints do not contend;
/// registration and removal take the write lock and never expose a
/// partially updated group.
pub struct NotificationHub {
    groups: RwLock<HashMap<Fingerprint, Vec<Subscriber>>>,
    next_id: AtomicU64,
}

impl NotificationHub {
    /// Create a new, empty hub.
    pub fn new() -> Self {
        Self {
            groups: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new observer for `fingerprint`.
    ///
    /// The observer only receives events broadcast after this call returns;
    /// there is no replay of earlier events.
    pub async fn register(&self, fingerprint: &str) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber {
            id,
            sender: tx,
            joined_at: chrono::Utc::now(),
        };

        let mut groups = self.groups.write().await;
        let group = groups.entry(fingerprint.to_string()).or_default();
        group.push(subscriber);
        tracing::debug!(fingerprint, id, subscribers = group.len(), "Observer registered");

        Subscription {
            handle: SubscriberHandle {
                fingerprint: fingerprint.to_string(),
                id,
            },
            receiver: rx,
        }
    }

    /// Remove one observer. Empty groups are dropped.
    ///
    /// Returns `false` when the handle was not registered (already removed
    /// or its group was closed).
    pub async fn unregister(&self, handle: &SubscriberHandle) -> bool {
        let mut groups = self.groups.write().await;
        let Some(group) = groups.get_mut(&handle.fingerprint) else {
            return false;
        };

        let before = group.len();
        group.retain(|s| s.id != handle.id);
        let removed = group.len() != before;
        if group.is_empty() {
            groups.remove(&handle.fingerprint);
        }
        if removed {
            tracing::debug!(fingerprint = %handle.fingerprint, id = handle.id, "Observer unregistered");
        }
        removed
    }

    /// Deliver `event` to every observer of its fingerprint.
    ///
    /// Delivery is best-effort per observer: a closed channel removes that
    /// observer and does not affect the others. Returns the number of
    /// observers the event was delivered to.
    pub async fn broadcast(&self, event: &ProgressEvent) -> usize {
        let fingerprint = event.fingerprint.as_str();
        let mut dead = Vec::new();
        let mut delivered = 0;

        {
            let groups = self.groups.read().await;
            let Some(group) = groups.get(fingerprint) else {
                return 0;
            };
            for subscriber in group {
                if subscriber
                    .sender
                    .send(HubMessage::Event(event.clone()))
                    .is_ok()
                {
                    delivered += 1;
                } else {
                    dead.push(subscriber.id);
                }
            }
        }

        if !dead.is_empty() {
            self.reap(fingerprint, &dead).await;
        }

        tracing::trace!(fingerprint, kind = event.type_name(), delivered, "Event broadcast");
        delivered
    }

    /// Disconnect every observer of `fingerprint` and drop the group.
    ///
    /// Each observer receives [`HubMessage::Close`], after which its channel
    /// ends. Returns the number of observers closed.
    pub async fn close_all(&self, fingerprint: &str) -> usize {
        let group = self.groups.write().await.remove(fingerprint);
        let Some(group) = group else {
            return 0;
        };
        let count = group.len();
        for subscriber in group {
            let _ = subscriber.sender.send(HubMessage::Close);
        }
        tracing::debug!(fingerprint, count, "Closed observer group");
        count
    }

    /// Close every group. Used during graceful shutdown.
    pub async fn shutdown_all(&self) {
        let mut groups = self.groups.write().await;
        let mut count = 0;
        for (_, group) in groups.drain() {
            for subscriber in group {
                let _ = subscriber.sender.send(HubMessage::Close);
                count += 1;
            }
        }
        tracing::info!(count, "Closed all observers");
    }

    /// Number of observers registered for `fingerprint`.
    pub async fn subscriber_count(&self, fingerprint: &str) -> usize {
        self.groups
            .read()
            .await
            .get(fingerprint)
            .map_or(0, Vec::len)
    }

    /// Number of fingerprints with at least one observer.
    pub async fn group_count(&self) -> usize {
        self.groups.read().await.len()
    }

    async fn reap(&self, fingerprint: &str, dead: &[u64]) {
        let mut groups = self.groups.write().await;
        if let Some(group) = groups.get_mut(fingerprint) {
            group.retain(|s| {
                let keep = !dead.contains(&s.id);
                if !keep {
                    tracing::debug!(
                        fingerprint,
                        id = s.id,
                        joined_at = %s.joined_at,
                        "Reaped disconnected observer"
                    );
                }
                keep
            });
            if group.is_empty() {
                groups.remove(fingerprint);
            }
        }
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
