//! Fan-out of [`StatusEvent`]s to stream subscribers.
//!
//! Every subscriber owns a bounded queue. Publishing offers the event to each
//! queue with `try_send`: a full queue loses that event for that subscriber
//! only, so a slow reader never blocks agents or other readers. Dropping a
//! [`Subscription`] unsubscribes it.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use crate::workflow::AgentStatus;

/// Queue capacity per subscriber.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

/// An agent's status at one moment. Immutable once published.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusEvent {
    pub agent_id: String,
    pub contest_id: String,
    pub participant_id: String,
    pub model_name: String,
    pub status: AgentStatus,
    pub current_step: String,
    pub timestamp: DateTime<Utc>,
}

struct Subscriber {
    contest_filter: Option<String>,
    tx: mpsc::Sender<StatusEvent>,
    dropped: u64,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_id: HashMap<u64, Subscriber>,
}

/// Owns the subscriber list. Cheap to clone; clones share subscribers.
#[derive(Clone)]
pub struct Broadcaster {
    subscribers: Arc<Mutex<Subscribers>>,
    capacity: usize,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::default(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber, optionally limited to one contest.
    pub fn subscribe(&self, contest_filter: Option<String>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.lock();
        let id = subs.next_id;
        subs.next_id += 1;
        subs.by_id.insert(
            id,
            Subscriber {
                contest_filter,
                tx,
                dropped: 0,
            },
        );
        debug!("Status subscriber {id} added ({} total)", subs.by_id.len());
        Subscription {
            id,
            rx,
            subscribers: self.subscribers.clone(),
        }
    }

    /// Offer `event` to every matching subscriber without waiting. Returns
    /// how many queues accepted it.
    pub fn publish(&self, event: &StatusEvent) -> usize {
        let mut subs = self.lock();
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, sub) in subs.by_id.iter_mut() {
            if sub
                .contest_filter
                .as_deref()
                .is_some_and(|c| c != event.contest_id)
            {
                continue;
            }
            match sub.tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    sub.dropped += 1;
                    warn!(
                        "Status queue full for subscriber {id}, dropped event for agent {} ({} dropped so far)",
                        event.agent_id, sub.dropped
                    );
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            subs.by_id.remove(&id);
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().by_id.len()
    }
}

/// A live subscription. Yields events as a [`Stream`]; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<StatusEvent>,
    subscribers: Arc<Mutex<Subscribers>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn recv(&mut self) -> Option<StatusEvent> {
        self.rx.recv().await
    }

    /// The next queued event, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<StatusEvent> {
        self.rx.try_recv().ok()
    }

    /// Events lost so far because this subscription's queue was full.
    pub fn dropped(&self) -> u64 {
        let subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.by_id.get(&self.id).map_or(0, |s| s.dropped)
    }
}

impl Stream for Subscription {
    type Item = StatusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StatusEvent>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut subs = self.subscribers.lock().unwrap_or_else(|e| e.into_inner());
        subs.by_id.remove(&self.id);
        debug!("Status subscriber {} removed ({} left)", self.id, subs.by_id.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn event(agent: &str, contest: &str) -> StatusEvent {
        StatusEvent {
            agent_id: agent.into(),
            contest_id: contest.into(),
            participant_id: "p".into(),
            model_name: "m".into(),
            status: AgentStatus::Coding,
            current_step: "coding".into(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn full_queue_drops_without_blocking_others() {
        let broadcaster = Broadcaster::new(2);
        let mut slow = broadcaster.subscribe(None);
        let mut fast = broadcaster.subscribe(None);

        for i in 0..2 {
            assert_eq!(broadcaster.publish(&event(&format!("a{i}"), "c1")), 2);
            assert_eq!(fast.recv().await.unwrap().agent_id, format!("a{i}"));
        }
        // `slow` is now full; the publisher returns immediately.
        let delivered = tokio::time::timeout(
            Duration::from_millis(100),
            async { broadcaster.publish(&event("a2", "c1")) },
        )
        .await
        .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(fast.recv().await.unwrap().agent_id, "a2");
        assert_eq!(slow.dropped(), 1);
        assert_eq!(fast.dropped(), 0);

        assert_eq!(slow.recv().await.unwrap().agent_id, "a0");
        assert_eq!(slow.recv().await.unwrap().agent_id, "a1");
        assert!(slow.try_recv().is_none());

        // Room again: delivery resumes and the count is kept.
        assert_eq!(broadcaster.publish(&event("a3", "c1")), 2);
        assert_eq!(slow.recv().await.unwrap().agent_id, "a3");
        assert_eq!(slow.dropped(), 1);
    }

    #[tokio::test]
    async fn contest_filter_applies_per_subscriber() {
        let broadcaster = Broadcaster::default();
        let mut only_c1 = broadcaster.subscribe(Some("c1".into()));
        let mut all = broadcaster.subscribe(None);

        broadcaster.publish(&event("a", "c2"));
        broadcaster.publish(&event("b", "c1"));

        assert_eq!(only_c1.recv().await.unwrap().agent_id, "b");
        assert_eq!(all.recv().await.unwrap().agent_id, "a");
        assert_eq!(all.recv().await.unwrap().agent_id, "b");
    }

    #[test]
    fn dropping_subscription_unsubscribes() {
        let broadcaster = Broadcaster::default();
        let sub = broadcaster.subscribe(None);
        let _other = broadcaster.subscribe(None);
        assert_eq!(broadcaster.subscriber_count(), 2);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn subscription_is_a_stream() {
        use futures::StreamExt;

        let broadcaster = Broadcaster::default();
        let mut sub = broadcaster.subscribe(None);
        broadcaster.publish(&event("a", "c1"));
        assert_eq!(sub.next().await.unwrap().agent_id, "a");
    }
}
