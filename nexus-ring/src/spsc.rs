//! Single-Producer Single-Consumer (SPSC) ring buffer.
//!
//! The baseline variant: each cursor has exactly one writer, so no
//! compare-and-swap is needed.
//!
//! # Design
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ head (cache-line padded) - written by consumer only      │
//! ├──────────────────────────────────────────────────────────┤
//! │ tail (cache-line padded) - written by producer only      │
//! ├──────────────────────────────────────────────────────────┤
//! │ buffer[0..capacity]: MaybeUninit<T>                      │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Both cursors are stored already masked into `[0, capacity)`. The producer
//! publishes a write by storing the new tail with `Release`; the consumer
//! publishes a read by storing the new head with `Release`. One slot is kept
//! free so `head == tail` always means empty: a ring with `capacity` slots
//! holds at most `capacity - 1` values.
//!
//! # Example
//!
//! ```
//! use nexus_ring::spsc;
//!
//! let (mut producer, mut consumer) = spsc::ring_buffer::<u64>(4);
//!
//! producer.push(1).unwrap();
//! producer.push(2).unwrap();
//! producer.push(3).unwrap();
//! assert!(producer.push(4).is_err()); // Full: one slot stays free
//!
//! assert_eq!(consumer.pop(), Some(1));
//! producer.push(4).unwrap();
//! ```

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

use crate::error::{self, CapacityError};
use crate::observe::{Event, Observer};
use crate::{Full, trace};

/// Creates a new SPSC ring buffer with room for at least `capacity` slots.
///
/// Returns a `(Producer, Consumer)` pair. The slot count is rounded up to
/// the next power of two (minimum 2).
///
/// # Panics
///
/// Panics if `capacity` is 0 or the ring cannot be allocated.
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    with_exponent(error::exponent_for(capacity)).unwrap_or_else(|e| panic!("{e}"))
}

/// Creates a new SPSC ring buffer with exactly `2^exponent` slots.
///
/// # Errors
///
/// Returns [`CapacityError`] if `exponent` is 0, too large, or the slot
/// storage cannot be allocated.
pub fn with_exponent<T>(exponent: u32) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    with_observer(exponent, ())
}

/// Creates a new SPSC ring buffer that reports to `observer`.
///
/// # Errors
///
/// Same as [`with_exponent`].
pub fn with_observer<T, O: Observer>(
    exponent: u32,
    observer: O,
) -> Result<(Producer<T, O>, Consumer<T, O>), CapacityError> {
    let capacity = error::capacity_for::<UnsafeCell<MaybeUninit<T>>>(exponent)?;
    let buffer = error::allocate(capacity, |_| UnsafeCell::new(MaybeUninit::uninit()))?;

    trace::debug!(capacity, "spsc ring allocated");

    let inner = Arc::new(Inner {
        head: CachePadded::new(AtomicU64::new(0)),
        tail: CachePadded::new(AtomicU64::new(0)),
        buffer,
        mask: capacity as u64 - 1,
        observer,
    });

    Ok((
        Producer {
            inner: Arc::clone(&inner),
        },
        Consumer { inner },
    ))
}

/// Shared state between producer and consumer.
struct Inner<T, O> {
    /// Consumer's read position, masked.
    head: CachePadded<AtomicU64>,
    /// Producer's write position, masked.
    tail: CachePadded<AtomicU64>,
    buffer: Box<[UnsafeCell<MaybeUninit<T>>]>,
    mask: u64,
    observer: O,
}

// Safety: slot `tail` is only written by the producer and slot `head` only
// read by the consumer; the cursors hand slots across with acquire/release.
unsafe impl<T: Send, O: Send> Send for Inner<T, O> {}
unsafe impl<T: Send, O: Sync> Sync for Inner<T, O> {}

impl<T, O> Inner<T, O> {
    #[inline]
    fn cell(&self, cursor: u64) -> *mut MaybeUninit<T> {
        // Safety: cursors are kept masked, so the index is in bounds.
        unsafe { self.buffer.get_unchecked(cursor as usize).get() }
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (tail.wrapping_sub(head) & self.mask) as usize
    }
}

impl<T, O> Drop for Inner<T, O> {
    fn drop(&mut self) {
        let mut head = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut dropped = 0usize;

        while head != tail {
            unsafe { self.buffer[head as usize].get_mut().assume_init_drop() };
            head = (head + 1) & self.mask;
            dropped += 1;
        }

        if dropped > 0 {
            trace::debug!(dropped, capacity = self.buffer.len(), "dropped undelivered values");
        }
    }
}

/// The producer half of an SPSC ring buffer.
///
/// Takes `&mut self` to statically ensure single-producer access.
pub struct Producer<T, O = ()> {
    inner: Arc<Inner<T, O>>,
}

impl<T, O: Observer> Producer<T, O> {
    /// Attempts to push a value into the ring buffer.
    ///
    /// Returns `Err(Full(value))` if the buffer is full, giving the value back.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::spsc;
    ///
    /// let (mut producer, mut consumer) = spsc::ring_buffer::<u32>(2);
    ///
    /// assert!(producer.push(1).is_ok());
    /// assert!(producer.push(2).is_err()); // Full
    /// ```
    #[inline]
    #[must_use = "push returns Err if full, which should be handled"]
    pub fn push(&mut self, value: T) -> Result<(), Full<T>> {
        let inner = &*self.inner;
        let tail = inner.tail.load(Ordering::Relaxed);
        let next = (tail + 1) & inner.mask;

        if next == inner.head.load(Ordering::Acquire) {
            return Err(Full(value));
        }

        unsafe { (*inner.cell(tail)).write(value) };
        inner.tail.store(next, Ordering::Release);

        inner.observer.on_push(Event {
            cursor: tail,
            sequence: next,
        });
        Ok(())
    }
}

impl<T, O> Producer<T, O> {
    /// Returns the number of slots. At most `capacity() - 1` values fit.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns the number of values currently in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the ring holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the consumer has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl<T, O> fmt::Debug for Producer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

/// The consumer half of an SPSC ring buffer.
///
/// Takes `&mut self` to statically ensure single-consumer access.
pub struct Consumer<T, O = ()> {
    inner: Arc<Inner<T, O>>,
}

impl<T, O: Observer> Consumer<T, O> {
    /// Attempts to pop a value from the ring buffer.
    ///
    /// Returns `Some(value)` if data is available, `None` if the buffer is
    /// empty. Values are returned in FIFO order.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::spsc;
    ///
    /// let (mut producer, mut consumer) = spsc::ring_buffer::<u32>(8);
    ///
    /// assert_eq!(consumer.pop(), None); // Empty
    ///
    /// producer.push(42).unwrap();
    /// assert_eq!(consumer.pop(), Some(42));
    /// ```
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        let inner = &*self.inner;
        let head = inner.head.load(Ordering::Relaxed);

        if head == inner.tail.load(Ordering::Acquire) {
            return None;
        }

        let value = unsafe { (*inner.cell(head)).assume_init_read() };
        let next = (head + 1) & inner.mask;
        inner.head.store(next, Ordering::Release);

        inner.observer.on_pop(Event {
            cursor: head,
            sequence: next,
        });
        Some(value)
    }
}

impl<T, O> Consumer<T, O> {
    /// Returns the number of slots. At most `capacity() - 1` values fit.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Returns the number of values currently in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the ring holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the producer has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }
}

impl<T, O> fmt::Debug for Consumer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
