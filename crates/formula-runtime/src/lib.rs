#![forbid(unsafe_code)]

//! Reactive runtime for formula: cells, derived values, effects, batching.

pub mod reactive;

pub use reactive::{Computed, Effect, MaybeReactive, Observable, batch, untrack};
