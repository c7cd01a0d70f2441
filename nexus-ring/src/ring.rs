//! Sequenced slot storage shared by the SPMC and MPMC rings.
//!
//! Each slot carries its own sequence number, which encodes the generation
//! of the ring that currently owns the slot:
//!
//! - `sequence == cursor`: slot is empty, writable for `cursor`
//! - `sequence == cursor + 1`: slot holds the value written for `cursor`
//! - `sequence == cursor + capacity`: slot recycled, writable next lap
//!
//! Memory layout:
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │ head (cache-line padded) - next cursor to consume     │
//! ├───────────────────────────────────────────────────────┤
//! │ tail (cache-line padded) - next cursor to produce     │
//! ├───────────────────────────────────────────────────────┤
//! │ slots ──► [ { sequence, value }; capacity ]           │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! The ring contains the values for cursors in `[head, tail)`. Cursors are
//! `u64` and wrap at 2^64, never at `capacity`; sequence differences are
//! taken as `i64` so "behind" and "ahead" survive the wrap.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::{self, CapacityError};
use crate::trace;

pub(crate) struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

pub(crate) struct Ring<T> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    slots: Box<[Slot<T>]>,
    mask: u64,
}

// Safety: slot contents are only touched by the thread holding the claim on
// that slot generation; claims are handed out through the atomics.
unsafe impl<T: Send> Send for Ring<T> {}
unsafe impl<T: Send> Sync for Ring<T> {}

impl<T> Ring<T> {
    /// Allocates a ring of `2^exponent` empty slots.
    pub(crate) fn with_exponent(exponent: u32) -> Result<Self, CapacityError> {
        Self::starting_at(exponent, 0)
    }

    /// Allocates a ring whose cursors begin at `start` instead of zero.
    ///
    /// Slot `i` is primed with the cursor in `[start, start + capacity)` that
    /// maps onto it.
    pub(crate) fn starting_at(exponent: u32, start: u64) -> Result<Self, CapacityError> {
        let capacity = error::capacity_for::<Slot<T>>(exponent)?;
        let mask = capacity as u64 - 1;

        let slots = error::allocate(capacity, |i| Slot {
            sequence: AtomicU64::new(start.wrapping_add((i as u64).wrapping_sub(start) & mask)),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        })?;

        Ok(Self {
            head: CachePadded::new(AtomicU64::new(start)),
            tail: CachePadded::new(AtomicU64::new(start)),
            slots,
            mask,
        })
    }

    #[inline]
    fn slot(&self, cursor: u64) -> &Slot<T> {
        // Safety: masking keeps the index below `slots.len()`.
        unsafe { self.slots.get_unchecked((cursor & self.mask) as usize) }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of values in the ring at the time of the call.
    ///
    /// Only exact when no push or pop is in progress.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.mask + 1) as usize
    }

    // === Producer side ===

    /// Checks whether the slot for the current tail is writable.
    ///
    /// Returns the tail cursor if so, `None` if a consumer has not yet
    /// vacated it (ring full). Does not advance the tail.
    ///
    /// Only valid with a single producer: nothing else may move `tail`
    /// between this call and [`advance_tail`](Self::advance_tail).
    #[inline]
    pub(crate) fn reserve_tail(&self) -> Option<u64> {
        let tail = self.tail.load(Ordering::Relaxed);
        let seq = self.slot(tail).sequence.load(Ordering::Acquire);
        let diff = seq.wrapping_sub(tail) as i64;

        if diff < 0 {
            return None;
        }
        debug_assert_eq!(diff, 0, "single-producer tail ran ahead of its slot");
        Some(tail)
    }

    /// Publishes the tail position after a single-producer write.
    #[inline]
    pub(crate) fn advance_tail(&self, tail: u64) {
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
    }

    /// Claims the next tail cursor with CAS, racing other producers.
    ///
    /// Returns `None` if the ring is full. Only loops while losing races to
    /// concurrent producers.
    #[inline]
    pub(crate) fn claim_tail(&self) -> Option<u64> {
        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let seq = self.slot(tail).sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(tail) as i64;

            if diff == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(tail),
                    Err(current) => {
                        tail = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                // Slot not yet recycled by a consumer
                return None;
            } else {
                // Another producer claimed this slot, our tail is stale
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Writes `value` into the slot for `cursor` and marks it readable.
    ///
    /// # Safety
    ///
    /// The caller must hold the producer claim on `cursor`, from
    /// [`claim_tail`](Self::claim_tail) or [`reserve_tail`](Self::reserve_tail),
    /// and call this exactly once per claim.
    #[inline]
    pub(crate) unsafe fn fill(&self, cursor: u64, value: T) {
        let slot = self.slot(cursor);
        unsafe { (*slot.value.get()).write(value) };
        slot.sequence
            .store(cursor.wrapping_add(1), Ordering::Release);
    }

    // === Consumer side ===

    /// Claims the next head cursor with CAS, racing other consumers.
    ///
    /// Returns `None` if the ring is empty. Only loops while losing races to
    /// concurrent consumers.
    #[inline]
    pub(crate) fn claim_head(&self) -> Option<u64> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let seq = self.slot(head).sequence.load(Ordering::Acquire);
            let diff = seq.wrapping_sub(head.wrapping_add(1)) as i64;

            if diff == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => return Some(head),
                    Err(current) => {
                        head = current;
                        backoff.spin();
                    }
                }
            } else if diff < 0 {
                // Not yet published for this generation
                return None;
            } else {
                // Another consumer took this slot, our head is stale
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Moves the value out of the slot for `cursor` and recycles the slot
    /// for the next lap.
    ///
    /// # Safety
    ///
    /// The caller must hold the consumer claim on `cursor` from
    /// [`claim_head`](Self::claim_head) and call this exactly once per claim.
    #[inline]
    pub(crate) unsafe fn take(&self, cursor: u64) -> T {
        let slot = self.slot(cursor);
        let value = unsafe { (*slot.value.get()).assume_init_read() };
        slot.sequence
            .store(cursor.wrapping_add(self.mask + 1), Ordering::Release);
        value
    }
}

impl<T> Drop for Ring<T> {
    fn drop(&mut self) {
        let mut cursor = *self.head.get_mut();
        let tail = *self.tail.get_mut();
        let mut dropped = 0usize;

        while cursor != tail {
            let slot = &mut self.slots[(cursor & self.mask) as usize];
            // Only slots whose write completed hold a value.
            if *slot.sequence.get_mut() == cursor.wrapping_add(1) {
                unsafe { slot.value.get_mut().assume_init_drop() };
                dropped += 1;
            }
            cursor = cursor.wrapping_add(1);
        }

        if dropped > 0 {
            trace::debug!(dropped, capacity = self.slots.len(), "dropped undelivered values");
        }
    }
}
