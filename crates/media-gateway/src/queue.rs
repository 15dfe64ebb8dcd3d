//! Bounded drop-oldest audio queue
//!
//! The real-time constraint shapes this queue: a full queue means the
//! consumer is behind, and the correct response is to discard the stalest
//! audio and count it, never to block the producer (an RTP receive loop or
//! a WebSocket read task). Capacity of 100 twenty-millisecond chunks is
//! about eight seconds of audio.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Default queue capacity in chunks
pub const DEFAULT_CAPACITY: usize = 100;

/// Bounded FIFO of PCM chunks with drop-oldest overflow.
pub struct BoundedAudioQueue {
    chunks: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    space: Notify,
    capacity: usize,
    overflow_count: AtomicU64,
    closed: Mutex<bool>,
}

impl BoundedAudioQueue {
    /// Create a queue holding at most `capacity` chunks.
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            space: Notify::new(),
            capacity,
            overflow_count: AtomicU64::new(0),
            closed: Mutex::new(false),
        }
    }

    /// Push a chunk, dropping the oldest if full. Never blocks.
    pub fn push(&self, chunk: Vec<u8>) {
        {
            let mut chunks = self.chunks.lock();
            if chunks.len() >= self.capacity {
                chunks.pop_front();
                self.overflow_count.fetch_add(1, Ordering::Relaxed);
            }
            chunks.push_back(chunk);
        }
        self.notify.notify_one();
    }

    /// Push a chunk, waiting for space instead of dropping.
    ///
    /// This is the outbound-path variant: a synthesis stream that outruns
    /// the wire should slow down, not lose audio. Returns `false` if the
    /// queue closed while waiting.
    pub async fn push_wait(&self, chunk: Vec<u8>) -> bool {
        let mut chunk = Some(chunk);
        loop {
            let space = self.space.notified();
            {
                let mut chunks = self.chunks.lock();
                if *self.closed.lock() {
                    return false;
                }
                if chunks.len() < self.capacity {
                    chunks.push_back(chunk.take().expect("chunk taken once"));
                    drop(chunks);
                    self.notify.notify_one();
                    return true;
                }
            }
            space.await;
        }
    }

    /// Pop the next chunk, waiting until one arrives or the queue closes.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Vec<u8>> {
        loop {
            let notified = self.notify.notified();
            {
                let mut chunks = self.chunks.lock();
                if let Some(chunk) = chunks.pop_front() {
                    drop(chunks);
                    self.space.notify_one();
                    return Some(chunk);
                }
                if *self.closed.lock() {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Pop without waiting.
    pub fn try_pop(&self) -> Option<Vec<u8>> {
        let chunk = self.chunks.lock().pop_front();
        if chunk.is_some() {
            self.space.notify_one();
        }
        chunk
    }

    /// Discard everything queued.
    pub fn clear(&self) {
        self.chunks.lock().clear();
        self.space.notify_waiters();
    }

    /// Close the queue; pending and future `pop`s drain then end.
    pub fn close(&self) {
        *self.closed.lock() = true;
        self.notify.notify_waiters();
        self.space.notify_waiters();
    }

    /// Chunks currently queued
    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.chunks.lock().is_empty()
    }

    /// Chunks dropped to overflow so far
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }
}

impl Default for BoundedAudioQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn fifo_order() {
        let queue = BoundedAudioQueue::new(10);
        queue.push(vec![1]);
        queue.push(vec![2]);
        assert_eq!(queue.pop().await, Some(vec![1]));
        assert_eq!(queue.pop().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let queue = BoundedAudioQueue::new(2);
        queue.push(vec![1]);
        queue.push(vec![2]);
        queue.push(vec![3]);

        assert_eq!(queue.overflow_count(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await, Some(vec![2]));
        assert_eq!(queue.pop().await, Some(vec![3]));
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(BoundedAudioQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.push(vec![7]);
        assert_eq!(waiter.await.unwrap(), Some(vec![7]));
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = BoundedAudioQueue::new(4);
        queue.push(vec![1]);
        queue.close();
        assert_eq!(queue.pop().await, Some(vec![1]));
        assert_eq!(queue.pop().await, None);
    }

    #[tokio::test]
    async fn push_wait_blocks_until_space() {
        let queue = Arc::new(BoundedAudioQueue::new(1));
        assert!(queue.push_wait(vec![1]).await);

        let pusher = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push_wait(vec![2]).await })
        };
        tokio::task::yield_now().await;
        // Still full; the pusher is parked, nothing was dropped
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.overflow_count(), 0);

        assert_eq!(queue.pop().await, Some(vec![1]));
        assert!(pusher.await.unwrap());
        assert_eq!(queue.pop().await, Some(vec![2]));
    }

    #[tokio::test]
    async fn push_wait_on_closed_queue_fails() {
        let queue = BoundedAudioQueue::new(1);
        queue.close();
        assert!(!queue.push_wait(vec![1]).await);
    }

    #[tokio::test]
    async fn close_wakes_blocked_pop() {
        let queue = Arc::new(BoundedAudioQueue::new(4));
        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        queue.close();
        assert_eq!(waiter.await.unwrap(), None);
    }
}
