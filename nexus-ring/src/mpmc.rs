//! Multi-Producer Multi-Consumer (MPMC) ring buffer.
//!
//! Producers race for slots with compare-and-swap on the tail, consumers with
//! compare-and-swap on the head. The per-slot sequence decides the outcome of
//! every attempt:
//!
//! | slot sequence vs. cursor | push | pop |
//! |--------------------------|------|-----|
//! | equal                    | CAS the tail, write | CAS the head, read |
//! | behind                   | full, return | empty, return |
//! | ahead                    | stale tail, reload | stale head, reload |
//!
//! Only one thread wins each CAS, so no two producers write the same slot
//! generation and no two consumers read it.
//!
//! # Example
//!
//! ```
//! use nexus_ring::mpmc;
//! use std::thread;
//!
//! let (tx, rx) = mpmc::ring_buffer::<u64>(1024);
//!
//! let producers: Vec<_> = (0..2)
//!     .map(|p| {
//!         let tx = tx.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 while tx.push(p * 100 + i).is_err() {
//!                     std::hint::spin_loop();
//!                 }
//!             }
//!         })
//!     })
//!     .collect();
//!
//! let mut received = Vec::new();
//! while received.len() < 200 {
//!     if let Some(v) = rx.pop() {
//!         received.push(v);
//!     }
//! }
//!
//! for p in producers {
//!     p.join().unwrap();
//! }
//! received.sort_unstable();
//! assert_eq!(received, (0..200).collect::<Vec<_>>());
//! ```
//!
//! # Performance Notes
//!
//! Unlike SPSC, both sides pay for an atomic read-modify-write per operation.
//! Contended retries back off with [`crossbeam_utils::Backoff`]. A full or
//! empty ring is reported immediately; the queue never waits for room.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{self, CapacityError};
use crate::observe::{Event, Observer};
use crate::ring::Ring;
use crate::{Full, trace};

/// Creates a new MPMC ring buffer with room for at least `capacity` values.
///
/// The actual capacity will be rounded up to the next power of two
/// (minimum 2) for efficient index masking.
///
/// # Panics
///
/// Panics if `capacity` is 0 or the ring cannot be allocated.
///
/// # Example
///
/// ```
/// use nexus_ring::mpmc;
///
/// let (tx, rx) = mpmc::ring_buffer::<String>(100);
/// // Actual capacity will be 128 (next power of two)
/// assert_eq!(tx.capacity(), 128);
/// ```
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    with_exponent(error::exponent_for(capacity)).unwrap_or_else(|e| panic!("{e}"))
}

/// Creates a new MPMC ring buffer with exactly `2^exponent` slots.
///
/// # Errors
///
/// Returns [`CapacityError`] if `exponent` is 0, too large, or the slot
/// storage cannot be allocated.
///
/// # Example
///
/// ```
/// use nexus_ring::{CapacityError, mpmc};
///
/// let (tx, _rx) = mpmc::with_exponent::<u64>(11).unwrap();
/// assert_eq!(tx.capacity(), 2048);
///
/// assert!(matches!(
///     mpmc::with_exponent::<u64>(0),
///     Err(CapacityError::TooSmall { .. })
/// ));
/// ```
pub fn with_exponent<T>(exponent: u32) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    with_observer(exponent, ())
}

/// Creates a new MPMC ring buffer that reports to `observer`.
///
/// # Errors
///
/// Same as [`with_exponent`].
pub fn with_observer<T, O: Observer>(
    exponent: u32,
    observer: O,
) -> Result<(Producer<T, O>, Consumer<T, O>), CapacityError> {
    let ring = Ring::with_exponent(exponent)?;
    trace::debug!(capacity = ring.capacity(), "mpmc ring allocated");
    Ok(from_ring(ring, observer))
}

fn from_ring<T, O>(ring: Ring<T>, observer: O) -> (Producer<T, O>, Consumer<T, O>) {
    let shared = Arc::new(Shared {
        ring,
        observer,
        producer_count: AtomicUsize::new(1),
        consumer_count: AtomicUsize::new(1),
    });

    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

struct Shared<T, O> {
    ring: Ring<T>,
    observer: O,
    /// Number of producer handles alive.
    producer_count: AtomicUsize,
    /// Number of consumer handles alive.
    consumer_count: AtomicUsize,
}

/// The producing half of an MPMC ring buffer.
///
/// Clone it, or share it by reference, to add producers.
pub struct Producer<T, O = ()> {
    shared: Arc<Shared<T, O>>,
}

impl<T, O: Observer> Producer<T, O> {
    /// Attempts to push a value into the ring.
    ///
    /// Makes a single attempt: retries only while losing the tail CAS to
    /// another producer, never while the ring is full.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the ring is full, giving the value back.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::{Full, mpmc};
    ///
    /// let (tx, rx) = mpmc::ring_buffer::<u32>(2);
    ///
    /// assert!(tx.push(1).is_ok());
    /// assert!(tx.push(2).is_ok());
    ///
    /// // Ring is now full
    /// assert_eq!(tx.push(3), Err(Full(3)));
    /// ```
    #[inline]
    #[must_use = "push returns Err if full, which should be handled"]
    pub fn push(&self, value: T) -> Result<(), Full<T>> {
        let shared = &*self.shared;

        let Some(tail) = shared.ring.claim_tail() else {
            return Err(Full(value));
        };

        // Safety: the CAS on tail gave us exclusive claim on this generation.
        unsafe { shared.ring.fill(tail, value) };

        shared.observer.on_push(Event {
            cursor: tail,
            sequence: tail.wrapping_add(1),
        });
        Ok(())
    }
}

impl<T, O> Producer<T, O> {
    /// Returns the capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Returns the number of values claimed into the ring and not yet
    /// claimed out of it.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    /// Returns `true` if the ring holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every consumer has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.shared.consumer_count.load(Ordering::Acquire) == 0
    }
}

impl<T, O> Clone for Producer<T, O> {
    fn clone(&self) -> Self {
        self.shared.producer_count.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, O> Drop for Producer<T, O> {
    fn drop(&mut self) {
        self.shared.producer_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T, O> fmt::Debug for Producer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}

/// The consuming half of an MPMC ring buffer.
///
/// Clone it, or share it by reference, to add consumers. Each value is
/// delivered to exactly one consumer.
pub struct Consumer<T, O = ()> {
    shared: Arc<Shared<T, O>>,
}

impl<T, O: Observer> Consumer<T, O> {
    /// Attempts to pop a value from the ring.
    ///
    /// Returns `None` if the ring is empty, including when a producer has
    /// claimed the next slot but not finished writing it.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::mpmc;
    ///
    /// let (tx, rx) = mpmc::ring_buffer::<u32>(8);
    ///
    /// assert_eq!(rx.pop(), None);
    ///
    /// tx.push(42).unwrap();
    /// assert_eq!(rx.pop(), Some(42));
    /// ```
    #[inline]
    pub fn pop(&self) -> Option<T> {
        let shared = &*self.shared;
        let head = shared.ring.claim_head()?;

        // Safety: the CAS on head gave us exclusive claim on this generation.
        let value = unsafe { shared.ring.take(head) };

        shared.observer.on_pop(Event {
            cursor: head,
            sequence: head.wrapping_add(shared.ring.capacity() as u64),
        });
        Some(value)
    }
}

impl<T, O> Consumer<T, O> {
    /// Returns the capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Returns the number of values claimed into the ring and not yet
    /// claimed out of it.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    /// Returns `true` if the ring holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if every producer has been dropped.
    ///
    /// Values may still be waiting in the ring.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        self.shared.producer_count.load(Ordering::Acquire) == 0
    }
}

impl<T, O> Clone for Consumer<T, O> {
    fn clone(&self) -> Self {
        self.shared.consumer_count.fetch_add(1, Ordering::Relaxed);
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T, O> Drop for Consumer<T, O> {
    fn drop(&mut self) {
        self.shared.consumer_count.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T, O> fmt::Debug for Consumer<T, O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("capacity", &self.capacity())
            .field("disconnected", &self.is_disconnected())
            .finish_non_exhaustive()
    }
}
