//! Single-Producer Multi-Consumer (SPMC) ring buffer.
//!
//! One producer writes without contention; any number of consumers race for
//! slots with compare-and-swap on the shared head.
//!
//! # Emptiness
//!
//! [`Consumer::pop`] returns `None` when the ring is empty, the same as the
//! SPSC and MPMC rings. [`Consumer::pop_spin`] is the busy-polling variant:
//! it keeps retrying while the producer is alive and only gives up once the
//! producer has been dropped and the ring is drained.
//!
//! # Example
//!
//! ```
//! use nexus_ring::spmc;
//! use std::thread;
//!
//! let (mut tx, rx) = spmc::ring_buffer::<u64>(64);
//!
//! let workers: Vec<_> = (0..4)
//!     .map(|_| {
//!         let rx = rx.clone();
//!         thread::spawn(move || {
//!             let mut sum = 0;
//!             while let Some(v) = rx.pop_spin() {
//!                 sum += v;
//!             }
//!             sum
//!         })
//!     })
//!     .collect();
//!
//! for i in 0..1000 {
//!     while tx.push(i).is_err() {
//!         std::hint::spin_loop();
//!     }
//! }
//! drop(tx);
//!
//! let total: u64 = workers.into_iter().map(|h| h.join().unwrap()).sum();
//! assert_eq!(total, 999 * 1000 / 2);
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_utils::Backoff;

use crate::error::{self, CapacityError};
use crate::observe::{Event, Observer};
use crate::ring::Ring;
use crate::{Full, trace};

/// Creates a new SPMC ring buffer with room for at least `capacity` values.
///
/// The actual capacity will be rounded up to the next power of two
/// (minimum 2).
///
/// # Panics
///
/// Panics if `capacity` is 0 or the ring cannot be allocated.
///
/// # Example
///
/// ```
/// use nexus_ring::spmc;
///
/// let (tx, rx) = spmc::ring_buffer::<String>(100);
/// assert_eq!(tx.capacity(), 128);
/// ```
pub fn ring_buffer<T>(capacity: usize) -> (Producer<T>, Consumer<T>) {
    with_exponent(error::exponent_for(capacity)).unwrap_or_else(|e| panic!("{e}"))
}

/// Creates a new SPMC ring buffer with exactly `2^exponent` slots.
///
/// # Errors
///
/// Returns [`CapacityError`] if `exponent` is 0, too large, or the slot
/// storage cannot be allocated.
pub fn with_exponent<T>(exponent: u32) -> Result<(Producer<T>, Consumer<T>), CapacityError> {
    with_observer(exponent, ())
}

/// Creates a new SPMC ring buffer that reports to `observer`.
///
/// # Errors
///
/// Same as [`with_exponent`].
pub fn with_observer<T, O: Observer>(
    exponent: u32,
    observer: O,
) -> Result<(Producer<T, O>, Consumer<T, O>), CapacityError> {
    let ring = Ring::with_exponent(exponent)?;
    trace::debug!(capacity = ring.capacity(), "spmc ring allocated");
    Ok(from_ring(ring, observer))
}

fn from_ring<T, O>(ring: Ring<T>, observer: O) -> (Producer<T, O>, Consumer<T, O>) {
    let shared = Arc::new(Shared {
        ring,
        observer,
        producer_alive: AtomicBool::new(true),
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
    /// Cleared when the producer is dropped.
    producer_alive: AtomicBool,
    /// Number of consumer handles alive.
    consumer_count: AtomicUsize,
}

/// The producing half of an SPMC ring buffer.
///
/// Not `Clone`; takes `&mut self` to statically ensure single-producer
/// access.
pub struct Producer<T, O = ()> {
    shared: Arc<Shared<T, O>>,
}

impl<T, O: Observer> Producer<T, O> {
    /// Attempts to push a value into the ring.
    ///
    /// Fails if the slot at the tail has not been vacated yet, which is the
    /// case when the ring is full or a slow consumer is still moving out the
    /// previous lap's value.
    ///
    /// # Errors
    ///
    /// Returns `Err(Full(value))` if the ring is full, giving the value back.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::spmc;
    ///
    /// let (mut tx, rx) = spmc::with_exponent::<u32>(1).unwrap();
    ///
    /// assert!(tx.push(1).is_ok());
    /// assert!(tx.push(2).is_ok());
    /// assert_eq!(tx.push(3).unwrap_err().into_inner(), 3);
    /// ```
    #[inline]
    #[must_use = "push returns Err if full, which should be handled"]
    pub fn push(&mut self, value: T) -> Result<(), Full<T>> {
        let shared = &*self.shared;

        let Some(tail) = shared.ring.reserve_tail() else {
            return Err(Full(value));
        };

        // Safety: we are the only producer, and the slot sequence says the
        // consumers are done with it.
        unsafe { shared.ring.fill(tail, value) };
        shared.ring.advance_tail(tail);

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

    /// Returns the number of values currently in the ring.
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

impl<T, O> Drop for Producer<T, O> {
    fn drop(&mut self) {
        self.shared.producer_alive.store(false, Ordering::Release);
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

/// The consuming half of an SPMC ring buffer.
///
/// Clone it to add consumers. All clones share the same ring, and each value
/// is delivered to exactly one of them.
pub struct Consumer<T, O = ()> {
    shared: Arc<Shared<T, O>>,
}

impl<T, O: Observer> Consumer<T, O> {
    /// Attempts to pop a value from the ring.
    ///
    /// Returns `None` if the ring is empty. Retries only while losing a race
    /// with another consumer for the same slot.
    ///
    /// # Example
    ///
    /// ```
    /// use nexus_ring::spmc;
    ///
    /// let (mut tx, rx) = spmc::ring_buffer::<u32>(8);
    /// let rx2 = rx.clone();
    ///
    /// tx.push(1).unwrap();
    /// tx.push(2).unwrap();
    ///
    /// assert_eq!(rx.pop(), Some(1));
    /// assert_eq!(rx2.pop(), Some(2));
    /// assert_eq!(rx.pop(), None);
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

    /// Pops a value, busy-retrying while the ring is empty.
    ///
    /// Backs off with spinning, then `yield_now`, between attempts. Returns
    /// `None` only once the producer has been dropped and nothing is left.
    /// Never returns while a live producer keeps the ring empty.
    pub fn pop_spin(&self) -> Option<T> {
        let backoff = Backoff::new();

        loop {
            if let Some(value) = self.pop() {
                return Some(value);
            }
            if !self.shared.producer_alive.load(Ordering::Acquire) {
                // Pushes made before the drop are visible now.
                return self.pop();
            }
            backoff.snooze();
        }
    }
}

impl<T, O> Consumer<T, O> {
    /// Returns the capacity of the ring.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.ring.capacity()
    }

    /// Returns the number of values currently in the ring.
    #[inline]
    pub fn len(&self) -> usize {
        self.shared.ring.len()
    }

    /// Returns `true` if the ring holds no values.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if the producer has been dropped.
    #[inline]
    pub fn is_disconnected(&self) -> bool {
        !self.shared.producer_alive.load(Ordering::Acquire)
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
