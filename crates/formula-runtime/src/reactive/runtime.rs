#![forbid(unsafe_code)]

//! Thread-local tracking context shared by every reactive node.
//!
//! The runtime owns three pieces of ambient state:
//!
//! - the **observer stack**: the computation currently running. Sources
//!   consult the top of the stack on read and register it as a subscriber.
//!   `None` entries mark untracked regions.
//! - the **batch depth**: while non-zero, effects that become stale are
//!   queued instead of run.
//! - the **pending queue**: stale effects waiting for the outermost batch to
//!   exit. Each effect is queued at most once per flush round.
//!
//! # Invariants
//!
//! 1. Every push onto the observer stack is matched by a pop, even when the
//!    tracked computation panics.
//! 2. The pending queue is drained only when the batch depth returns to zero.
//! 3. Within one flush round effects run in creation order.
//! 4. A flush never re-enters itself; effects queued while flushing are
//!    picked up by the next round of the same flush.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use super::effect::EffectNode;

/// Identifier shared by every node kind (cells, derived values, effects).
pub(crate) type NodeId = u64;

/// Upper bound on flush rounds before the queue is considered cyclic.
const MAX_FLUSH_ROUNDS: usize = 1_000;

/// Something that can be read inside a tracked computation.
pub(crate) trait Source {
    fn id(&self) -> NodeId;

    /// Version of the value as currently cached. Bumps only on real change.
    fn version(&self) -> u64;

    /// Bring a lazily derived value up to date. No-op for plain cells.
    fn refresh(&self);

    fn unsubscribe(&self, subscriber: NodeId);
}

/// Something that reads sources and wants to hear when they change.
pub(crate) trait Subscriber {
    fn id(&self) -> NodeId;

    /// Called when an upstream source changed.
    fn notify(&self);

    /// Record that `source` was read during the current run.
    fn record_source(&self, source: Rc<dyn Source>);
}

/// Subscriber list held by every source, in subscription order.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: RefCell<Vec<(NodeId, Weak<dyn Subscriber>)>>,
}

impl Subscribers {
    pub(crate) fn add(&self, subscriber: &Rc<dyn Subscriber>) {
        let id = subscriber.id();
        let mut entries = self.entries.borrow_mut();
        if !entries.iter().any(|(existing, _)| *existing == id) {
            entries.push((id, Rc::downgrade(subscriber)));
        }
    }

    pub(crate) fn remove(&self, id: NodeId) {
        self.entries.borrow_mut().retain(|(existing, _)| *existing != id);
    }

    pub(crate) fn len(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }

    /// Notify every live subscriber. Dead entries are pruned lazily here.
    pub(crate) fn notify_all(&self) {
        let live: Vec<Rc<dyn Subscriber>> = {
            let mut entries = self.entries.borrow_mut();
            entries.retain(|(_, weak)| weak.strong_count() > 0);
            entries.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for subscriber in live {
            subscriber.notify();
        }
    }
}

struct Runtime {
    next_id: Cell<NodeId>,
    observers: RefCell<Vec<Option<Rc<dyn Subscriber>>>>,
    batch_depth: Cell<usize>,
    flushing: Cell<bool>,
    pending: RefCell<Vec<Rc<EffectNode>>>,
}

impl Runtime {
    fn new() -> Self {
        Self {
            next_id: Cell::new(1),
            observers: RefCell::new(Vec::new()),
            batch_depth: Cell::new(0),
            flushing: Cell::new(false),
            pending: RefCell::new(Vec::new()),
        }
    }
}

thread_local! {
    static RUNTIME: Runtime = Runtime::new();
}

pub(crate) fn next_id() -> NodeId {
    RUNTIME.with(|rt| {
        let id = rt.next_id.get();
        rt.next_id.set(id + 1);
        id
    })
}

/// Register `source` as a dependency of the running computation, if any.
pub(crate) fn track<S: Source + 'static>(source: &Rc<S>, subscribers: &Subscribers) {
    let observer = RUNTIME.with(|rt| rt.observers.borrow().last().cloned().flatten());
    let Some(observer) = observer else {
        return;
    };
    if observer.id() == source.id() {
        return;
    }
    subscribers.add(&observer);
    let source: Rc<dyn Source> = source.clone();
    observer.record_source(source);
}

struct ObserverGuard;

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.observers.borrow_mut().pop());
    }
}

/// Run `f` with `observer` on top of the tracking stack.
pub(crate) fn with_observer<R>(observer: Option<Rc<dyn Subscriber>>, f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.observers.borrow_mut().push(observer));
    let _guard = ObserverGuard;
    f()
}

/// Run `f` without registering any of its reads as dependencies.
///
/// Used to read a cell from inside an effect without subscribing to it,
/// which is how subscription cycles are broken.
pub fn untrack<R>(f: impl FnOnce() -> R) -> R {
    with_observer(None, f)
}

/// Whether the calling code is inside a tracked computation.
#[must_use]
pub fn is_tracking() -> bool {
    RUNTIME.with(|rt| matches!(rt.observers.borrow().last(), Some(Some(_))))
}

struct BatchGuard;

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let outermost = RUNTIME
            .try_with(|rt| {
                let depth = rt.batch_depth.get().saturating_sub(1);
                rt.batch_depth.set(depth);
                depth == 0
            })
            .unwrap_or(false);
        if outermost && !std::thread::panicking() {
            flush();
        }
    }
}

/// Defer effect re-runs until `f` (and any enclosing batch) returns.
///
/// Nested batches collapse into the outermost one. Every effect made stale
/// inside the scope runs at most once, after the outermost scope exits, and
/// observes the final state.
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    RUNTIME.with(|rt| rt.batch_depth.set(rt.batch_depth.get() + 1));
    let _guard = BatchGuard;
    f()
}

/// Whether a batch scope is currently open on this thread.
#[must_use]
pub fn is_batching() -> bool {
    RUNTIME.with(|rt| rt.batch_depth.get() > 0)
}

/// Queue a stale effect. Runs when the outermost batch exits.
pub(crate) fn enqueue(effect: Rc<EffectNode>) {
    RUNTIME.with(|rt| rt.pending.borrow_mut().push(effect));
}

struct FlushGuard;

impl Drop for FlushGuard {
    fn drop(&mut self) {
        let _ = RUNTIME.try_with(|rt| rt.flushing.set(false));
    }
}

fn flush() {
    let already_flushing = RUNTIME.with(|rt| rt.flushing.replace(true));
    if already_flushing {
        return;
    }
    let _guard = FlushGuard;

    let mut rounds = 0usize;
    loop {
        let mut round: Vec<Rc<EffectNode>> =
            RUNTIME.with(|rt| std::mem::take(&mut *rt.pending.borrow_mut()));
        if round.is_empty() {
            break;
        }
        rounds += 1;
        if rounds > MAX_FLUSH_ROUNDS {
            tracing::warn!(
                message = "formula.effect.flush_overflow",
                rounds,
                dropped = round.len()
            );
            for effect in round {
                effect.clear_queued();
            }
            break;
        }
        round.sort_by_key(|effect| effect.node_id());
        tracing::trace!(message = "formula.effect.flush", round = rounds, effects = round.len());
        for effect in round {
            effect.run_scheduled();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{Effect, Observable};

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = next_id();
        let b = next_id();
        assert!(b > a);
    }

    #[test]
    fn untrack_hides_reads_from_effects() {
        let cell = Observable::new(1);
        let runs = Rc::new(Cell::new(0));
        let runs_in = Rc::clone(&runs);
        let cell_in = cell.clone();
        let _effect = Effect::new(move || {
            untrack(|| cell_in.get());
            runs_in.set(runs_in.get() + 1);
        });
        assert_eq!(runs.get(), 1);
        cell.set(2);
        assert_eq!(runs.get(), 1);
        assert_eq!(cell.subscriber_count(), 0);
    }

    #[test]
    fn is_tracking_only_inside_effects() {
        assert!(!is_tracking());
        let seen = Rc::new(Cell::new(false));
        let seen_in = Rc::clone(&seen);
        let _effect = Effect::new(move || seen_in.set(is_tracking()));
        assert!(seen.get());
        assert!(!is_tracking());
    }

    #[test]
    fn batching_flag_tracks_scope() {
        assert!(!is_batching());
        batch(|| {
            assert!(is_batching());
            batch(|| assert!(is_batching()));
            assert!(is_batching());
        });
        assert!(!is_batching());
    }

    #[test]
    fn observer_stack_recovers_after_panic() {
        let result = std::panic::catch_unwind(|| {
            with_observer(None, || panic!("boom"));
        });
        assert!(result.is_err());
        assert!(!is_tracking());
        RUNTIME.with(|rt| assert!(rt.observers.borrow().is_empty()));
    }
}
