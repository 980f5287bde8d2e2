//! Blocking Frame Queue
//!
//! FIFO hand-off between the decoder callback thread and the presentation
//! thread. Enqueue never blocks; dequeue blocks until an item arrives or the
//! queue is interrupted. Interruption is one-way and reported through return
//! values, never as an error.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Outcome of [`BlockingQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueResult {
    Queued,
    /// Queued, but the backlog limit was hit and the oldest item was dropped
    QueuedDroppingOldest,
    /// Queue is shut down; the item was dropped
    Interrupted,
}

/// Outcome of the non-blocking and timed dequeue variants
#[derive(Debug, PartialEq, Eq)]
pub enum Dequeue<T> {
    Item(T),
    /// Nothing available right now
    Empty,
    /// Queue is shut down
    Interrupted,
}

struct Inner<T> {
    items: VecDeque<T>,
    interrupted: bool,
}

/// Thread-safe FIFO with blocking dequeue and interruptible shutdown
pub struct BlockingQueue<T> {
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    /// 0 = unbounded
    limit: usize,
}

impl<T> BlockingQueue<T> {
    /// Unbounded queue
    pub fn new() -> Self {
        Self::with_limit(0)
    }

    /// Queue that drops its oldest item once more than `limit` are pending.
    /// A limit of 0 disables the check.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(limit.max(4)),
                interrupted: false,
            }),
            not_empty: Condvar::new(),
            limit,
        }
    }

    pub fn enqueue(&self, item: T) -> EnqueueResult {
        let mut inner = self.inner.lock();
        if inner.interrupted {
            drop(inner);
            drop(item);
            return EnqueueResult::Interrupted;
        }

        inner.items.push_back(item);
        let evicted = if self.limit > 0 && inner.items.len() > self.limit {
            inner.items.pop_front()
        } else {
            None
        };
        drop(inner);

        self.not_empty.notify_one();

        // Release evicted buffers outside the lock
        match evicted {
            Some(old) => {
                drop(old);
                EnqueueResult::QueuedDroppingOldest
            }
            None => EnqueueResult::Queued,
        }
    }

    /// Blocks until an item is available. Returns `None` once interrupted.
    pub fn dequeue(&self) -> Option<T> {
        let mut inner = self.inner.lock();
        loop {
            if inner.interrupted {
                return None;
            }
            if let Some(item) = inner.items.pop_front() {
                return Some(item);
            }
            self.not_empty.wait(&mut inner);
        }
    }

    pub fn try_dequeue(&self) -> Dequeue<T> {
        let mut inner = self.inner.lock();
        if inner.interrupted {
            return Dequeue::Interrupted;
        }
        match inner.items.pop_front() {
            Some(item) => Dequeue::Item(item),
            None => Dequeue::Empty,
        }
    }

    pub fn dequeue_timeout(&self, timeout: Duration) -> Dequeue<T> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if inner.interrupted {
                return Dequeue::Interrupted;
            }
            if let Some(item) = inner.items.pop_front() {
                return Dequeue::Item(item);
            }
            if self.not_empty.wait_until(&mut inner, deadline).timed_out() {
                // One last look in case a notify raced the timeout
                if inner.interrupted {
                    return Dequeue::Interrupted;
                }
                return match inner.items.pop_front() {
                    Some(item) => Dequeue::Item(item),
                    None => Dequeue::Empty,
                };
            }
        }
    }

    /// Advisory size, may be stale by the time it is read
    pub fn count(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_interrupted(&self) -> bool {
        self.inner.lock().interrupted
    }

    /// Wake every waiter and drop pending items. Idempotent.
    pub fn interrupt(&self) {
        let pending = {
            let mut inner = self.inner.lock();
            inner.interrupted = true;
            std::mem::take(&mut inner.items)
        };
        self.not_empty.notify_all();
        drop(pending);
    }
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_fifo_order() {
        let queue = BlockingQueue::new();
        for i in 0..100 {
            assert_eq!(queue.enqueue(i), EnqueueResult::Queued);
        }
        assert_eq!(queue.count(), 100);

        let drained: Vec<i32> = (0..100).filter_map(|_| queue.dequeue()).collect();
        assert_eq!(drained, (0..100).collect::<Vec<_>>());
        assert_eq!(queue.count(), 0);
        assert_eq!(queue.try_dequeue(), Dequeue::Empty);
    }

    #[test]
    fn test_fifo_across_threads() {
        let queue = Arc::new(BlockingQueue::new());
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..1000u32 {
                    queue.enqueue(i);
                }
            })
        };

        let mut received = Vec::with_capacity(1000);
        while received.len() < 1000 {
            received.push(queue.dequeue().unwrap());
        }
        producer.join().unwrap();

        assert!(received.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_multi_producer_multi_consumer_no_loss() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 3;
        const PER_PRODUCER: u32 = 500;
        let total = PRODUCERS * PER_PRODUCER as usize;

        let queue: Arc<BlockingQueue<(usize, u32)>> = Arc::new(BlockingQueue::new());
        let delivered = Arc::new(AtomicUsize::new(0));

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = queue.clone();
                let delivered = delivered.clone();
                thread::spawn(move || {
                    let mut received = Vec::new();
                    while let Some(item) = queue.dequeue() {
                        received.push(item);
                        delivered.fetch_add(1, Ordering::SeqCst);
                    }
                    received
                })
            })
            .collect();

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..PER_PRODUCER {
                        assert_eq!(queue.enqueue((producer, seq)), EnqueueResult::Queued);
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while delivered.load(Ordering::SeqCst) < total && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        queue.interrupt();

        let mut all = Vec::with_capacity(total);
        for consumer in consumers {
            let received = consumer.join().unwrap();
            // Each consumer sees every producer's items in submission order
            for producer in 0..PRODUCERS {
                let seqs: Vec<u32> = received.iter().filter(|(p, _)| *p == producer).map(|(_, s)| *s).collect();
                assert!(seqs.windows(2).all(|w| w[0] < w[1]));
            }
            all.extend(received);
        }

        all.sort_unstable();
        let expected: Vec<(usize, u32)> = (0..PRODUCERS)
            .flat_map(|p| (0..PER_PRODUCER).map(move |s| (p, s)))
            .collect();
        assert_eq!(all, expected);
    }

    #[test]
    fn test_interrupt_wakes_all_waiters() {
        let queue: Arc<BlockingQueue<u32>> = Arc::new(BlockingQueue::new());
        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                thread::spawn(move || queue.dequeue())
            })
            .collect();

        thread::sleep(Duration::from_millis(50));
        queue.interrupt();

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), None);
        }
        assert!(queue.is_interrupted());
    }

    #[test]
    fn test_enqueue_after_interrupt_is_dropped() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = BlockingQueue::new();
        queue.interrupt();
        queue.interrupt();

        assert_eq!(queue.enqueue(DropCounter(drops.clone())), EnqueueResult::Interrupted);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(queue.dequeue().is_none());
        assert!(matches!(queue.try_dequeue(), Dequeue::Interrupted));
        assert_eq!(queue.count(), 0);
    }

    #[test]
    fn test_interrupt_releases_pending_items() {
        let drops = Arc::new(AtomicUsize::new(0));
        let queue = BlockingQueue::new();
        for _ in 0..3 {
            queue.enqueue(DropCounter(drops.clone()));
        }

        queue.interrupt();
        assert_eq!(drops.load(Ordering::SeqCst), 3);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_limit_drops_oldest() {
        let queue = BlockingQueue::with_limit(2);
        assert_eq!(queue.enqueue(1), EnqueueResult::Queued);
        assert_eq!(queue.enqueue(2), EnqueueResult::Queued);
        assert_eq!(queue.enqueue(3), EnqueueResult::QueuedDroppingOldest);

        assert_eq!(queue.count(), 2);
        assert_eq!(queue.dequeue(), Some(2));
        assert_eq!(queue.dequeue(), Some(3));
    }

    #[test]
    fn test_dequeue_timeout() {
        let queue: BlockingQueue<u8> = BlockingQueue::new();
        let start = Instant::now();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Dequeue::Empty);
        assert!(start.elapsed() >= Duration::from_millis(20));

        queue.enqueue(7);
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Dequeue::Item(7));

        queue.interrupt();
        assert_eq!(queue.dequeue_timeout(Duration::from_millis(20)), Dequeue::Interrupted);
    }
}
