#![forbid(unsafe_code)]

//! Reactive cells with automatic dependency tracking.
//!
//! This module provides the primitives everything else in formula is built
//! on:
//!
//! - [`Observable`]: a shared, version-tracked mutable cell.
//! - [`Computed`]: a lazily-evaluated, memoized value derived from whatever
//!   it reads.
//! - [`Effect`]: a side effect that re-runs when anything it read changes.
//! - [`batch`] / [`untrack`]: scope helpers for deferring effects and for
//!   reading without subscribing.
//! - [`MaybeReactive`]: plain-or-reactive configuration values.
//!
//! # Architecture
//!
//! All nodes use `Rc` + interior mutability for single-threaded shared
//! ownership. A thread-local observer stack records which computation is
//! running; sources register that computation on read. Invalidation is
//! pushed eagerly (cells mark derived values dirty and queue effects),
//! evaluation is pulled lazily (derived values recompute on the next read).
//!
//! # Invariants
//!
//! 1. Subscribers are notified in subscription order; queued effects run in
//!    creation order.
//! 2. Setting a value equal to the current value is a no-op.
//! 3. No effect observes a partially applied batch.
//! 4. `Computed::get()` never returns a stale value.
//! 5. A disposed (or dropped) effect never runs again.

pub mod computed;
pub mod effect;
pub mod maybe;
pub mod observable;
mod runtime;

pub use computed::Computed;
pub use effect::Effect;
pub use maybe::MaybeReactive;
pub use observable::Observable;
pub use runtime::{batch, is_batching, is_tracking, untrack};
