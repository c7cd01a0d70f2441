//! Caller-injected hooks for watching values move through a ring.
//!
//! Rings are generic over an [`Observer`], defaulting to `()`, which compiles
//! to nothing. The hook runs on the calling thread after the slot has been
//! published, so it never extends a slot claim.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use nexus_ring::mpmc;
//! use nexus_ring::observe::Counters;
//!
//! let counters = Arc::new(Counters::new());
//! let (tx, rx) = mpmc::with_observer::<u64, _>(4, Arc::clone(&counters)).unwrap();
//!
//! tx.push(1).unwrap();
//! tx.push(2).unwrap();
//! assert_eq!(rx.pop(), Some(1));
//!
//! assert_eq!(counters.pushed(), 2);
//! assert_eq!(counters.popped(), 1);
//! assert_eq!(counters.high_water(), 2);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_utils::CachePadded;

/// A successful push or pop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Logical cursor of the slot that was produced or consumed.
    ///
    /// For SPSC rings this is the masked slot position.
    pub cursor: u64,
    /// Sequence value published for the slot (`cursor + 1` after a push,
    /// `cursor + capacity` after a pop). For SPSC rings, the cursor value
    /// published to the other side.
    pub sequence: u64,
}

/// Hook notified after every successful push and pop.
///
/// Implementations must be cheap and must not touch the ring they observe.
pub trait Observer: Send + Sync {
    /// Called after a value has been published.
    #[inline]
    fn on_push(&self, _event: Event) {}

    /// Called after a value has been moved out.
    #[inline]
    fn on_pop(&self, _event: Event) {}
}

impl Observer for () {}

impl<O: Observer + ?Sized> Observer for Arc<O> {
    #[inline]
    fn on_push(&self, event: Event) {
        (**self).on_push(event);
    }

    #[inline]
    fn on_pop(&self, event: Event) {
        (**self).on_pop(event);
    }
}

impl<O: Observer + ?Sized> Observer for &O {
    #[inline]
    fn on_push(&self, event: Event) {
        (**self).on_push(event);
    }

    #[inline]
    fn on_pop(&self, event: Event) {
        (**self).on_pop(event);
    }
}

/// Running totals of pushes and pops.
///
/// Counts are exact once all threads have finished. While threads are
/// running, [`in_flight`](Counters::in_flight) and the high-water mark are
/// estimates: a pop can be reported before the push it consumed.
#[derive(Debug, Default)]
pub struct Counters {
    pushed: CachePadded<AtomicU64>,
    popped: CachePadded<AtomicU64>,
    high_water: AtomicU64,
}

impl Counters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total successful pushes.
    pub fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    /// Total successful pops.
    pub fn popped(&self) -> u64 {
        self.popped.load(Ordering::Relaxed)
    }

    /// Values pushed but not yet popped.
    pub fn in_flight(&self) -> u64 {
        self.pushed().saturating_sub(self.popped())
    }

    /// Largest in-flight count seen by any push.
    pub fn high_water(&self) -> u64 {
        self.high_water.load(Ordering::Relaxed)
    }
}

impl Observer for Counters {
    #[inline]
    fn on_push(&self, _event: Event) {
        let pushed = self.pushed.fetch_add(1, Ordering::Relaxed) + 1;
        let in_flight = pushed.saturating_sub(self.popped.load(Ordering::Relaxed));
        self.high_water.fetch_max(in_flight, Ordering::Relaxed);
    }

    #[inline]
    fn on_pop(&self, _event: Event) {
        self.popped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Logs every push and pop as a `trace`-level event.
///
/// This is slow and meant for debugging protocol issues at small scale.
#[cfg(feature = "tracing")]
#[derive(Debug, Clone, Copy)]
pub struct TracingObserver {
    name: &'static str,
}

#[cfg(feature = "tracing")]
impl TracingObserver {
    /// Creates an observer that tags events with `name`.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[cfg(feature = "tracing")]
impl Observer for TracingObserver {
    fn on_push(&self, event: Event) {
        tracing::trace!(
            ring = self.name,
            cursor = event.cursor,
            sequence = event.sequence,
            "push"
        );
    }

    fn on_pop(&self, event: Event) {
        tracing::trace!(
            ring = self.name,
            cursor = event.cursor,
            sequence = event.sequence,
            "pop"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_observer_is_noop() {
        let event = Event {
            cursor: 0,
            sequence: 1,
        };
        ().on_push(event);
        ().on_pop(event);
    }

    #[test]
    fn counters_track_high_water() {
        let counters = Counters::new();
        let event = Event {
            cursor: 0,
            sequence: 1,
        };

        counters.on_push(event);
        counters.on_push(event);
        counters.on_push(event);
        counters.on_pop(event);
        counters.on_push(event);

        assert_eq!(counters.pushed(), 4);
        assert_eq!(counters.popped(), 1);
        assert_eq!(counters.in_flight(), 3);
        assert_eq!(counters.high_water(), 3);
    }

    #[test]
    fn arc_and_ref_forward() {
        let counters = Arc::new(Counters::new());
        let event = Event {
            cursor: 7,
            sequence: 8,
        };

        Arc::clone(&counters).on_push(event);
        let by_ref: &Counters = &counters;
        Observer::on_pop(&by_ref, event);

        assert_eq!(counters.pushed(), 1);
        assert_eq!(counters.popped(), 1);
    }
}
