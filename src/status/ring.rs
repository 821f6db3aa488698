//! Fixed-capacity ring buffer of recent log lines
//!
//! One writer (the log watcher) appends while the heartbeat takes snapshots.
//! Both go through the same mutex, so a snapshot never observes a
//! half-finished eviction.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Bounded FIFO that evicts its oldest element on overflow
pub struct RingBuffer<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    evicted_count: AtomicUsize,
}

impl<T: Clone> RingBuffer<T> {
    /// Create a ring buffer holding at most `capacity` items.
    ///
    /// A zero capacity is bumped to 1; config validation rejects it earlier.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            evicted_count: AtomicUsize::new(0),
        }
    }

    /// Append an item, evicting the oldest one when full
    pub fn push(&self, item: T) {
        let mut items = self.items.lock();
        if items.len() == self.capacity {
            items.pop_front();
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
    }

    /// Copy of the current contents, oldest first
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of items dropped to make room since creation
    pub fn evicted_count(&self) -> usize {
        self.evicted_count.load(Ordering::Relaxed)
    }
}

/// Thread-safe handle to a ring buffer
pub type SharedRingBuffer<T> = Arc<RingBuffer<T>>;

/// Create a new shared ring buffer
pub fn create_shared_buffer<T: Clone>(capacity: usize) -> SharedRingBuffer<T> {
    Arc::new(RingBuffer::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_buffer_basic() {
        let buffer = RingBuffer::new(4);

        buffer.push("a");
        buffer.push("b");
        assert_eq!(buffer.len(), 2);
        assert!(!buffer.is_full());
        assert_eq!(buffer.snapshot(), vec!["a", "b"]);
    }

    #[test]
    fn test_overflow_evicts_oldest() {
        let buffer = RingBuffer::new(3);
        for i in 0..5 {
            buffer.push(i);
        }

        assert!(buffer.is_full());
        assert_eq!(buffer.snapshot(), vec![2, 3, 4]);
        assert_eq!(buffer.evicted_count(), 2);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let buffer = RingBuffer::new(2);
        buffer.push(1);
        let before = buffer.snapshot();
        buffer.push(2);
        buffer.push(3);

        assert_eq!(before, vec![1]);
        assert_eq!(buffer.snapshot(), vec![2, 3]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let buffer = RingBuffer::new(0);
        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.capacity(), 1);
        assert_eq!(buffer.snapshot(), vec![2]);
    }

    #[test]
    fn test_concurrent_snapshots_never_exceed_capacity() {
        let buffer = create_shared_buffer::<usize>(8);
        let writer = {
            let buffer = buffer.clone();
            std::thread::spawn(move || {
                for i in 0..10_000 {
                    buffer.push(i);
                }
            })
        };

        for _ in 0..1_000 {
            let snap = buffer.snapshot();
            assert!(snap.len() <= 8);
            assert!(snap.windows(2).all(|w| w[1] == w[0] + 1));
        }
        writer.join().unwrap();
    }

    proptest! {
        #[test]
        fn prop_keeps_last_n_in_order(capacity in 1usize..32, items in prop::collection::vec(any::<u32>(), 0..200)) {
            let buffer = RingBuffer::new(capacity);
            for item in &items {
                buffer.push(*item);
            }

            let expected: Vec<u32> = items
                .iter()
                .skip(items.len().saturating_sub(capacity))
                .copied()
                .collect();
            prop_assert_eq!(buffer.snapshot(), expected);
            prop_assert!(buffer.len() <= capacity);
        }
    }
}
