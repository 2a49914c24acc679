use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use engine_core::Handler;
use tokio::sync::Notify;

pub const DEFAULT_INBOX_CAPACITY: usize = 100;

struct Shared {
    queue: Mutex<VecDeque<Vec<u8>>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

/// Bounded queue of broadcast payloads for one session.
///
/// Pushing into a full inbox evicts the oldest message, so publishers never
/// wait on a slow reader.
#[derive(Clone)]
pub struct Inbox {
    shared: Arc<Shared>,
}

impl Inbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                notify: Notify::new(),
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Vec<u8>>> {
        self.shared
            .queue
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a payload. Returns false when an older message was evicted.
    pub fn push(&self, payload: Vec<u8>) -> bool {
        let evicted = {
            let mut queue = self.queue();
            let evicted = if queue.len() >= self.shared.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(payload);
            evicted
        };
        if evicted {
            let total = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(capacity = self.shared.capacity, dropped_total = total, "inbox full, dropped oldest message");
        }
        self.shared.notify.notify_one();
        !evicted
    }

    pub fn try_recv(&self) -> Option<Vec<u8>> {
        self.queue().pop_front()
    }

    /// Wait for the next payload. Cancel-safe.
    pub async fn recv(&self) -> Vec<u8> {
        loop {
            if let Some(payload) = self.try_recv() {
                return payload;
            }
            self.shared.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Messages evicted so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// A pub/sub handler that feeds this inbox.
    pub fn handler(&self) -> Handler {
        let inbox = self.clone();
        Arc::new(move |payload: &[u8]| {
            inbox.push(payload.to_vec());
        })
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new(DEFAULT_INBOX_CAPACITY)
    }
}

impl std::fmt::Debug for Inbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inbox")
            .field("len", &self.len())
            .field("capacity", &self.shared.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}
