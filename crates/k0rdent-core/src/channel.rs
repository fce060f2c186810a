//! Bounded update queue with drop-oldest overflow.
//!
//! Every subscription producer publishes through one of these. A slow
//! consumer never blocks a producer: when the queue is full the oldest
//! undelivered item is discarded, preserving liveness over completeness.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

struct Shared<T> {
    queue: Mutex<VecDeque<T>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

pub struct QueueSender<T> {
    shared: Arc<Shared<T>>,
}

pub struct QueueReceiver<T> {
    shared: Arc<Shared<T>>,
}

/// Create a bounded drop-oldest queue. `capacity` must be non-zero.
pub fn bounded_queue<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    assert!(capacity > 0, "queue capacity must be non-zero");
    let shared = Arc::new(Shared {
        queue: Mutex::new(VecDeque::with_capacity(capacity)),
        notify: Notify::new(),
        capacity,
        closed: AtomicBool::new(false),
    });
    (
        QueueSender {
            shared: Arc::clone(&shared),
        },
        QueueReceiver { shared },
    )
}

impl<T> QueueSender<T> {
    /// Push an item, discarding the oldest queued item on overflow. Returns
    /// `true` when an item was dropped to make room.
    pub fn push(&self, item: T) -> bool {
        let dropped = {
            let mut queue = self.shared.queue.lock().unwrap();
            let dropped = if queue.len() >= self.shared.capacity {
                queue.pop_front();
                true
            } else {
                false
            };
            queue.push_back(item);
            dropped
        };
        self.shared.notify.notify_one();
        dropped
    }

    /// Close the queue. Queued items remain receivable; `recv` returns `None`
    /// once drained.
    pub fn close(&self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.notify.notify_waiters();
        self.shared.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        // Last sender gone: the shared Arc is held by the receiver plus any
        // sender clones, so 2 remaining means only us + receiver.
        if Arc::strong_count(&self.shared) <= 2 {
            self.close();
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Receive the next item, waiting if the queue is empty. Returns `None`
    /// after the queue is closed and fully drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(item) = self.shared.queue.lock().unwrap().pop_front() {
                return Some(item);
            }
            if self.shared.closed.load(Ordering::SeqCst) {
                return None;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<T> {
        self.shared.queue.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order() {
        let (tx, mut rx) = bounded_queue(8);
        tx.push(1);
        tx.push(2);
        tx.push(3);
        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (tx, mut rx) = bounded_queue(2);
        assert!(!tx.push(1));
        assert!(!tx.push(2));
        assert!(tx.push(3));
        assert_eq!(rx.recv().await, Some(2));
        assert_eq!(rx.recv().await, Some(3));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let (tx, mut rx) = bounded_queue(4);
        tx.push("a");
        tx.close();
        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropping_sender_closes_queue() {
        let (tx, mut rx) = bounded_queue::<u32>(4);
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn recv_wakes_on_push() {
        let (tx, mut rx) = bounded_queue(4);
        let handle = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;
        tx.push(42);
        assert_eq!(handle.await.unwrap(), Some(42));
    }
}
