//! Bounded, thread-safe FIFOs carrying opaque typed chunks between stages.
//! Push never blocks past a short bounded wait; when full it drops and
//! reports so — a pause in a downstream stage must never stall the audio
//! callback or the network reader.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::QUEUE_PUSH_WAIT;

struct Inner<T> {
    items: VecDeque<T>,
}

/// A bounded FIFO. `T` is typically `Vec<u8>` (encoded frames / batch
/// members) or `Vec<i16>` (decoded PCM).
pub struct Queue<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
}

impl<T> Queue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner { items: VecDeque::new() }),
            not_full: Condvar::new(),
        }
    }

    /// Push a chunk. Waits up to `QUEUE_PUSH_WAIT` for room; if still full,
    /// drops the chunk and returns `false`. Never blocks indefinitely.
    pub fn push(&self, item: T) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.items.len() >= self.capacity {
            let deadline = Instant::now() + QUEUE_PUSH_WAIT;
            while inner.items.len() >= self.capacity {
                let now = Instant::now();
                if now >= deadline {
                    log::warn!("queue full, dropping chunk (capacity {})", self.capacity);
                    return false;
                }
                let (guard, _timeout) = self
                    .not_full
                    .wait_timeout(inner, deadline - now)
                    .unwrap();
                inner = guard;
            }
        }
        inner.items.push_back(item);
        true
    }

    /// Pop the oldest chunk, or `None` if empty. Never blocks.
    pub fn pop(&self) -> Option<T> {
        let mut inner = self.inner.lock().unwrap();
        let item = inner.items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Consumers that genuinely need to wait (e.g. a decoder that has nothing to
// do while its input queue is empty) should poll `pop` and sleep a small
// interval between retries.
pub const POLL_SLEEP: Duration = Duration::from_millis(5);


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// For any capacity and any sequence of items no longer than that
        /// capacity, every push succeeds and pop returns them in the same
        /// order they were pushed.
        #[test]
        fn fifo_order_holds_for_any_sequence_within_capacity(
            capacity in 1usize..64,
            items in proptest::collection::vec(any::<i32>(), 0..64)
        ) {
            prop_assume!(items.len() <= capacity);
            let q: Queue<i32> = Queue::new(capacity);
            for &item in &items {
                prop_assert!(q.push(item));
            }
            for &item in &items {
                prop_assert_eq!(q.pop(), Some(item));
            }
            prop_assert_eq!(q.pop(), None);
        }
    }
}
