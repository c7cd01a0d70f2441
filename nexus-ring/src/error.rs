//! Error types for ring construction and bounded push.

use std::alloc::Layout;
use std::fmt;

/// Error returned when a ring is full.
///
/// Contains the value that could not be pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Full<T>(pub T);

impl<T> Full<T> {
    /// Returns the value that could not be pushed.
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ring buffer is full")
    }
}

impl<T: fmt::Debug> std::error::Error for Full<T> {}

/// A ring could not be built with the requested capacity.
///
/// This is the only failure a ring reports outside of `push`/`pop`, and it
/// only happens at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityError {
    /// Exponent 0 asks for a single slot, which cannot tell full from empty.
    TooSmall {
        /// The requested exponent.
        exponent: u32,
    },
    /// `2^exponent` slots exceed the address space or layout limits.
    TooLarge {
        /// The requested exponent.
        exponent: u32,
    },
    /// The allocator refused the slot storage.
    OutOfMemory {
        /// Number of slots that were requested.
        capacity: usize,
    },
}

impl fmt::Display for CapacityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooSmall { exponent } => {
                write!(f, "capacity exponent {exponent} is too small (minimum 1)")
            }
            Self::TooLarge { exponent } => {
                write!(f, "capacity exponent {exponent} exceeds addressable memory")
            }
            Self::OutOfMemory { capacity } => {
                write!(f, "failed to allocate storage for {capacity} slots")
            }
        }
    }
}

impl std::error::Error for CapacityError {}

/// Validates `exponent` and returns `2^exponent`, the slot count.
///
/// `S` is the per-slot storage type; its layout bounds the largest exponent.
pub(crate) fn capacity_for<S>(exponent: u32) -> Result<usize, CapacityError> {
    if exponent == 0 {
        return Err(CapacityError::TooSmall { exponent });
    }
    let capacity = 1usize
        .checked_shl(exponent)
        .ok_or(CapacityError::TooLarge { exponent })?;
    Layout::array::<S>(capacity).map_err(|_| CapacityError::TooLarge { exponent })?;
    Ok(capacity)
}

/// Exponent of the smallest power of two holding `capacity` (minimum 2 slots).
///
/// # Panics
///
/// Panics if `capacity` is 0 or rounds past `usize::MAX`.
pub(crate) fn exponent_for(capacity: usize) -> u32 {
    assert!(capacity > 0, "capacity must be non-zero");
    let rounded = capacity
        .checked_next_power_of_two()
        .expect("capacity too large");
    rounded.max(2).trailing_zeros()
}

/// Allocates `capacity` cells, initializing each from its index.
///
/// Allocation failure is reported instead of aborting.
pub(crate) fn allocate<S>(
    capacity: usize,
    init: impl FnMut(usize) -> S,
) -> Result<Box<[S]>, CapacityError> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(capacity)
        .map_err(|_| CapacityError::OutOfMemory { capacity })?;
    cells.extend((0..capacity).map(init));
    Ok(cells.into_boxed_slice())
}
