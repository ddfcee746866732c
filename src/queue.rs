//! Bounded, thread-safe FIFO of samples shared between the network worker
//! and the consumer context.

use crate::types::Sample;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Fixed-capacity sample buffer with drop-oldest overflow.
///
/// One mutex guards every operation; the lock is held only for the copy or
/// removal itself, never across I/O. After any mutation the queue holds at
/// most `capacity` samples, always the most recently pushed ones in arrival
/// order.
///
/// Reads are non-destructive: [`snapshot`](Self::snapshot) copies the current
/// contents and leaves them in place. A consumer that wants to avoid
/// re-observing the same samples calls [`clear`](Self::clear) after it has
/// taken what it needs (at-least-once hand-off, see `DataReceiver`).
#[derive(Debug)]
pub struct SampleQueue {
    inner: Mutex<VecDeque<Sample>>,
    capacity: usize,
}

impl SampleQueue {
    /// Create a queue holding at most `capacity` samples. A capacity of 0 is
    /// a misconfiguration and is clamped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    /// Append one sample, evicting from the front if the bound is exceeded.
    pub fn push(&self, sample: Sample) {
        let mut queue = self.inner.lock();
        queue.push_back(sample);
        while queue.len() > self.capacity {
            queue.pop_front();
        }
    }

    /// Append a batch under a single lock acquisition.
    pub fn extend<I: IntoIterator<Item = Sample>>(&self, samples: I) {
        let mut queue = self.inner.lock();
        for sample in samples {
            queue.push_back(sample);
            while queue.len() > self.capacity {
                queue.pop_front();
            }
        }
    }

    /// Copy of everything currently buffered, oldest first. Does not consume.
    pub fn snapshot(&self) -> Vec<Sample> {
        let queue = self.inner.lock();
        queue.iter().copied().collect()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
