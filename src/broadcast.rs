use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use camera_bus::frame::EncodedFrame;
use tokio::sync::Notify;

/// Fans encoded frames out to every live subscriber.
///
/// Each subscriber owns a bounded queue; `publish` never blocks on any of
/// them. When a queue is full the oldest undelivered frame is dropped for
/// the newest — live video has no value in stale frames. Subscribers see
/// only frames published after they joined, in publish order.
pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberSlot>>>,
    next_id: AtomicU64,
    queue_depth: usize,
    dropped_frames: AtomicU64,
}

struct SubscriberSlot {
    queue: Mutex<VecDeque<EncodedFrame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl SubscriberSlot {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_one();
    }
}

impl Broadcaster {
    pub fn new(queue_depth: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_depth: queue_depth.max(1),
            dropped_frames: AtomicU64::new(0),
        })
    }

    /// Register a subscriber; it receives frames from this point forward.
    pub fn subscribe(self: &Arc<Self>) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot::new());
        self.subscribers
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&slot));
        log::debug!("subscriber {} joined", id);
        SubscriberHandle {
            id,
            slot,
            broadcaster: Arc::clone(self),
        }
    }

    /// Queue one frame for every subscriber without blocking on any of them.
    pub fn publish(&self, frame: &EncodedFrame) {
        let subscribers = self.subscribers.lock().unwrap();
        for slot in subscribers.values() {
            let mut queue = slot.queue.lock().unwrap();
            if queue.len() >= self.queue_depth {
                queue.pop_front();
                self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            }
            queue.push_back(frame.clone());
            drop(queue);
            slot.notify.notify_one();
        }
    }

    /// Remove a subscriber. Idempotent; runs from the handle's `Drop` and
    /// from the write-error path without conflict.
    pub fn unsubscribe(&self, id: u64) {
        if let Some(slot) = self.subscribers.lock().unwrap().remove(&id) {
            slot.close();
            log::debug!("subscriber {} left", id);
        }
    }

    /// Signal stream end: every subscriber drains its queue and then sees
    /// `None`.
    pub fn close_all(&self) {
        let mut subscribers = self.subscribers.lock().unwrap();
        for (_, slot) in subscribers.drain() {
            slot.close();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().unwrap().len()
    }

    pub fn frames_dropped(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

/// Receiving side of one subscription. Dropping it unsubscribes.
pub struct SubscriberHandle {
    id: u64,
    slot: Arc<SubscriberSlot>,
    broadcaster: Arc<Broadcaster>,
}

impl SubscriberHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next frame; `None` once the stream has ended and the
    /// queue is drained.
    pub async fn next(&mut self) -> Option<EncodedFrame> {
        loop {
            let notified = self.slot.notify.notified();
            if let Some(frame) = self.slot.queue.lock().unwrap().pop_front() {
                return Some(frame);
            }
            if self.slot.closed.load(Ordering::Acquire) {
                return None;
            }
            notified.await;
        }
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        self.broadcaster.unsubscribe(self.id);
    }
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod broadcast_test;
