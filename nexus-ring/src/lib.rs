//! # nexus-ring
//!
//! Fixed-capacity lock-free ring buffers for handing values between threads
//! without blocking.
//!
//! ## Variants
//!
//! - **[`spsc`]**: single producer, single consumer. No compare-and-swap;
//!   each cursor has exactly one writer.
//! - **[`spmc`]**: single producer, many consumers. Consumers race for slots
//!   with CAS on the shared head.
//! - **[`mpmc`]**: many producers, many consumers. Both sides race with CAS.
//!
//! Every constructor returns a `(Producer, Consumer)` pair sharing one ring.
//! The single/multi contract of each variant is enforced by the handle types:
//! single-access halves are not `Clone` and take `&mut self`.
//!
//! ## Design Goals
//!
//! - Power-of-two slot count, fixed for the life of the ring
//! - No allocations after construction
//! - Cache-line isolation of head and tail to prevent false sharing
//! - Per-slot sequence counters, so a slot's readiness is tied to a strictly
//!   increasing generation rather than a wrapping index
//!
//! Full and empty are ordinary results (`Err(Full(value))` and `None`), not
//! faults. The rings never wait for room or data; callers pick their own
//! retry or backoff policy.
//!
//! ## Example
//!
//! ```
//! use nexus_ring::spsc;
//!
//! // 1024 slots (rounded up to the next power of two)
//! let (mut tx, mut rx) = spsc::ring_buffer::<u64>(1024);
//!
//! tx.push(42).unwrap();
//! assert_eq!(rx.pop(), Some(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

mod error;
mod ring;

pub mod mpmc;
pub mod observe;
pub mod spmc;
pub mod spsc;
pub mod trace;

pub use error::{CapacityError, Full};
pub use observe::{Event, Observer};
