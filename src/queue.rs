//! Lock-free command queue with a two-phase atomic sentry: many producers
//! enqueue into pre-allocated slots, a single consumer drains between audio
//! cycles.
//!
//! Grounded in the reference implementation's `sentry_` atomic with a
//! high-bit drain flag: `queue()` bumps the sentry on entry (aborting if the
//! drain bit is set), claims a slot index, writes, then decrements the
//! sentry; `drain()` flips the drain bit and waits for any writers already
//! in flight before iterating the claimed slots.

use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::status::Status;

const DRAIN_BIT: i32 = 1 << 31;

pub struct SentryQueue<T> {
    sentry: AtomicI32,
    size: AtomicUsize,
    capacity: usize,
    buffer: Mutex<Vec<Option<T>>>,
}

impl<T> SentryQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let mut buffer = Vec::with_capacity(capacity);
        buffer.resize_with(capacity, || None);
        SentryQueue {
            sentry: AtomicI32::new(0),
            size: AtomicUsize::new(0),
            capacity,
            buffer: Mutex::new(buffer),
        }
    }

    /// Enqueues `item`. Fails with `failed_precondition` if a drain is in
    /// progress, or `out_of_bounds` if the queue is full.
    pub fn queue(&self, item: T) -> Result<(), Status> {
        let entering = self.sentry.fetch_add(1, Ordering::AcqRel);
        if entering & DRAIN_BIT != 0 {
            self.sentry.fetch_sub(1, Ordering::AcqRel);
            return Err(Status::failed_precondition("cannot queue while a drain is in progress"));
        }

        let index = self.size.fetch_add(1, Ordering::AcqRel);
        if index >= self.capacity {
            self.size.fetch_sub(1, Ordering::AcqRel);
            self.sentry.fetch_sub(1, Ordering::AcqRel);
            return Err(Status::out_of_bounds("command queue is at capacity"));
        }

        let mut buffer = self.buffer.lock().expect("queue buffer lock poisoned");
        buffer[index] = Some(item);
        drop(buffer);

        self.sentry.fetch_sub(1, Ordering::AcqRel);
        Ok(())
    }

    /// Drains all queued items to `consume`, then resets the queue for
    /// reuse. Spin-waits for any producer that entered before the drain bit
    /// was set to finish writing its slot.
    pub fn drain(&self, mut consume: impl FnMut(T)) {
        let previous = self.sentry.fetch_or(DRAIN_BIT, Ordering::AcqRel);
        while self.sentry.load(Ordering::Acquire) & !DRAIN_BIT != previous & !DRAIN_BIT {
            std::hint::spin_loop();
            if self.sentry.load(Ordering::Acquire) & !DRAIN_BIT == 0 {
                break;
            }
        }

        let mut buffer = self.buffer.lock().expect("queue buffer lock poisoned");
        let count = self.size.load(Ordering::Acquire).min(self.capacity);
        for slot in buffer.iter_mut().take(count) {
            if let Some(item) = slot.take() {
                consume(item);
            }
        }
        self.size.store(0, Ordering::Release);
        drop(buffer);

        self.sentry.store(0, Ordering::Release);
    }

    pub fn len(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_and_drain_roundtrip() {
        let q: SentryQueue<i32> = SentryQueue::new(4);
        q.queue(1).unwrap();
        q.queue(2).unwrap();
        q.queue(3).unwrap();

        let mut drained = Vec::new();
        q.drain(|v| drained.push(v));
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(q.is_empty());
    }

    #[test]
    fn queue_rejects_over_capacity() {
        let q: SentryQueue<i32> = SentryQueue::new(2);
        q.queue(1).unwrap();
        q.queue(2).unwrap();
        let err = q.queue(3).unwrap_err();
        assert_eq!(err.kind(), Some(crate::status::ErrorKind::OutOfBounds));
    }

    #[test]
    fn queue_after_drain_resets_capacity() {
        let q: SentryQueue<i32> = SentryQueue::new(1);
        q.queue(1).unwrap();
        q.drain(|_| {});
        q.queue(2).unwrap();
        assert_eq!(q.len(), 1);
    }
}
