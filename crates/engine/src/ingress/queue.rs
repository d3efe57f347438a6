use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

/// Bounded fan-out queue with drop-oldest overflow. The producer never
/// waits: when full, the oldest waiting item is evicted and counted so the
/// newest sample is always admitted. tokio's mpsc cannot evict from the
/// sender side, hence the hand-wired mutex + notify pair.
pub struct DropOldestQueue<T> {
    inner: Arc<QueueInner<T>>,
}

pub struct QueueReceiver<T> {
    inner: Arc<QueueInner<T>>,
}

struct QueueInner<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    dropped: AtomicU64,
    closed: AtomicU64,
    notify: Notify,
}

pub fn channel<T>(capacity: usize) -> (DropOldestQueue<T>, QueueReceiver<T>) {
    let inner = Arc::new(QueueInner {
        items: Mutex::new(VecDeque::with_capacity(capacity)),
        capacity,
        dropped: AtomicU64::new(0),
        closed: AtomicU64::new(0),
        notify: Notify::new(),
    });
    (
        DropOldestQueue {
            inner: inner.clone(),
        },
        QueueReceiver { inner },
    )
}

impl<T> DropOldestQueue<T> {
    /// Enqueue without blocking. Returns true when an older item was
    /// evicted to make room.
    pub fn push(&self, item: T) -> bool {
        let mut evicted = false;
        {
            let mut items = self.inner.items.lock().unwrap_or_else(|e| e.into_inner());
            if items.len() == self.inner.capacity {
                items.pop_front();
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                evicted = true;
            }
            items.push_back(item);
        }
        self.inner.notify.notify_one();
        evicted
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn close(&self) {
        self.inner.closed.store(1, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }
}

impl<T> QueueReceiver<T> {
    /// Next item, or None once the queue is closed and drained.
    pub async fn recv(&self) -> Option<T> {
        loop {
            {
                let mut items = self.inner.items.lock().unwrap_or_else(|e| e.into_inner());
                if let Some(item) = items.pop_front() {
                    return Some(item);
                }
            }
            if self.inner.closed.load(Ordering::SeqCst) == 1 {
                return None;
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn try_recv(&self) -> Option<T> {
        self.inner
            .items
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }
}
