use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::EmptyQueue;

/// The capacity of a newly created queue, and the floor it never shrinks
/// below.
pub const MIN_CAPACITY: usize = 16;

/// An unbounded FIFO queue over a power-of-two circular buffer.
///
/// The buffer doubles once it is full and halves once three quarters of it
/// become unused, so both [`enqueue`](Self::enqueue) and
/// [`dequeue`](Self::dequeue) are amortized `O(1)`.
///
/// All state lives behind a single [`RwLock`]. Observers (`len`, `peek`, ...)
/// share the read side while `enqueue` and `dequeue` take the write side, so
/// each call is one critical section. Wrap the queue in an
/// [`Arc`](std::sync::Arc) or borrow it from scoped threads to share it.
pub struct RingQueue<T> {
    inner: RwLock<Ring<T>>,
}

struct Ring<T> {
    // Slots outside `[head, head + len)` are always `None`.
    buf: Box<[Option<T>]>,
    head: usize,
    tail: usize,
    len: usize,
}

impl<T> RingQueue<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Ring::new(MIN_CAPACITY)),
        }
    }

    pub fn len(&self) -> usize {
        self.read().len
    }

    pub fn is_empty(&self) -> bool {
        self.read().len == 0
    }

    /// Returns the number of slots currently allocated.
    pub fn capacity(&self) -> usize {
        self.read().capacity()
    }

    /// Appends `val` to the back of the queue, growing the buffer if it is
    /// full.
    pub fn enqueue(&self, val: T) {
        self.write().enqueue(val)
    }

    /// Removes the oldest element of the queue.
    ///
    /// Never blocks: an empty queue fails immediately with [`EmptyQueue`].
    pub fn dequeue(&self) -> Result<T, EmptyQueue> {
        self.write().dequeue()
    }

    /// Returns a copy of the oldest element without removing it.
    pub fn peek(&self) -> Result<T, EmptyQueue>
    where
        T: Clone,
    {
        self.peek_with(T::clone)
    }

    /// Calls `f` with the oldest element while the read lock is held.
    ///
    /// This is the only way to inspect an element in place; the reference
    /// cannot outlive the call.
    pub fn peek_with<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, EmptyQueue> {
        self.read().front().map(f)
    }

    // Nothing that can panic runs between two updates of the ring, so the
    // state behind a poisoned lock is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, Ring<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Ring<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for RingQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ring = self.read();
        f.debug_struct("RingQueue")
            .field("len", &ring.len)
            .field("capacity", &ring.capacity())
            .finish_non_exhaustive()
    }
}

impl<T> Ring<T> {
    fn new(capacity: usize) -> Self {
        Self {
            buf: alloc_buffer(capacity),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn ring_mask(&self) -> usize {
        debug_assert!(self.capacity().is_power_of_two());
        self.capacity() - 1
    }

    fn front(&self) -> Result<&T, EmptyQueue> {
        if self.len == 0 {
            return Err(EmptyQueue);
        }
        Ok(self.buf[self.head]
            .as_ref()
            .expect("live slot must be occupied"))
    }

    fn enqueue(&mut self, val: T) {
        if self.len == self.capacity() {
            let from = self.capacity();
            self.resize(self.len << 1);
            tracing::debug!(
                "grew ring queue, from={from} to={} len={}",
                self.capacity(),
                self.len,
            );
        }

        debug_assert!(self.buf[self.tail].is_none());
        self.buf[self.tail] = Some(val);
        self.tail = (self.tail + 1) & self.ring_mask();
        self.len += 1;
    }

    fn dequeue(&mut self) -> Result<T, EmptyQueue> {
        if self.len == 0 {
            return Err(EmptyQueue);
        }

        // Taking the value out clears the slot, so the ring never keeps a
        // removed element alive.
        let val = self.buf[self.head]
            .take()
            .expect("live slot must be occupied");
        self.head = (self.head + 1) & self.ring_mask();
        self.len -= 1;

        if self.capacity() > MIN_CAPACITY && self.len << 2 == self.capacity() {
            let from = self.capacity();
            self.resize(self.len << 1);
            tracing::debug!(
                "shrank ring queue, from={from} to={} len={}",
                self.capacity(),
                self.len,
            );
        }

        Ok(val)
    }

    /// Moves all live elements into a new buffer of `capacity` slots, with the
    /// oldest one at index 0.
    fn resize(&mut self, capacity: usize) {
        debug_assert!(capacity.is_power_of_two());
        debug_assert!(capacity >= MIN_CAPACITY && capacity >= self.len);

        let Self {
            buf,
            head,
            tail,
            len,
        } = self;
        let mut new_buf = alloc_buffer(capacity);

        let (before_head, from_head) = buf.split_at_mut(*head);
        let (first, second) = if *tail > *head {
            // `[head, tail)` is contiguous.
            (&mut from_head[..*len], &mut before_head[..0])
        } else {
            // Wrapped (or full): `[head, capacity)` followed by `[0, tail)`.
            (from_head, &mut before_head[..*tail])
        };
        debug_assert_eq!(first.len() + second.len(), *len);
        for (dst, src) in new_buf
            .iter_mut()
            .zip(first.iter_mut().chain(second.iter_mut()))
        {
            *dst = src.take();
        }

        *head = 0;
        *tail = *len;
        *buf = new_buf;
    }
}

fn alloc_buffer<T>(size: usize) -> Box<[Option<T>]> {
    std::iter::repeat_with(|| None).take(size).collect()
}
