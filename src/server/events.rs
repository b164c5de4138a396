//! In-memory event fan-out with a bounded queue per subscriber.
//!
//! Slow consumers lose their oldest buffered events rather than blocking
//! the publisher (newest-wins lossy policy).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde::Serialize;
use tokio::sync::Notify;

use crate::wire::State;

/// Change events pushed to UI subscribers over SSE.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BroadcastEvent {
    ItemStatusUpdate {
        sensor_id: String,
        item_id: Option<String>,
        state: State,
        normalized_value: Option<f64>,
        ts: String,
    },
    AlertCreated {
        alert_id: i64,
        sensor_id: String,
        item_id: Option<String>,
        state: State,
        created_at: String,
        message: String,
    },
    AlertResolved {
        sensor_id: String,
        item_id: Option<String>,
        resolved_at: String,
    },
    AlertAcknowledged {
        alert_id: i64,
        acknowledged_at: String,
    },
}

struct SubscriberQueue {
    events: Mutex<VecDeque<BroadcastEvent>>,
    notify: Notify,
}

struct Inner {
    queue_size: usize,
    subscribers: Mutex<Vec<Arc<SubscriberQueue>>>,
}

/// Cheaply cloneable handle shared between the ingest handlers (publish)
/// and the SSE workers (subscribe).
#[derive(Clone)]
pub struct EventBroadcaster {
    inner: Arc<Inner>,
}

impl EventBroadcaster {
    /// `queue_size` is clamped to a minimum of 10 per subscriber.
    pub fn new(queue_size: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue_size: queue_size.max(10),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        });
        lock(&self.inner.subscribers).push(Arc::clone(&queue));
        Subscription {
            queue,
            broadcaster: Arc::downgrade(&self.inner),
        }
    }

    /// Never blocks and never fails: a full subscriber queue drops its
    /// oldest event to make room.
    pub fn publish(&self, event: BroadcastEvent) {
        let subscribers: Vec<_> = lock(&self.inner.subscribers).iter().cloned().collect();
        for subscriber in subscribers {
            {
                let mut events = lock(&subscriber.events);
                if events.len() >= self.inner.queue_size {
                    events.pop_front();
                }
                events.push_back(event.clone());
            }
            subscriber.notify.notify_one();
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self) -> usize {
        lock(&self.inner.subscribers).len()
    }
}

/// A live subscription; dropping it removes the subscriber.
pub struct Subscription {
    queue: Arc<SubscriberQueue>,
    broadcaster: Weak<Inner>,
}

impl Subscription {
    pub async fn recv(&self) -> BroadcastEvent {
        loop {
            let notified = self.queue.notify.notified();
            if let Some(event) = lock(&self.queue.events).pop_front() {
                return event;
            }
            notified.await;
        }
    }

    pub fn try_recv(&self) -> Option<BroadcastEvent> {
        lock(&self.queue.events).pop_front()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.broadcaster.upgrade() {
            lock(&inner.subscribers).retain(|queue| !Arc::ptr_eq(queue, &self.queue));
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
