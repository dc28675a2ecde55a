#![forbid(unsafe_code)]

//! Lazy derived values that auto-track their dependencies.
//!
//! # Design
//!
//! [`Computed<T>`] wraps a compute function and its cached result in shared,
//! reference-counted storage. The dependencies are whatever the compute
//! function reads while it runs; they are re-recorded on every
//! recomputation, so conditional reads are handled. When any dependency
//! changes, the cached value is invalidated (marked dirty) and the
//! invalidation is pushed to the computed value's own subscribers. The next
//! read recomputes and caches the result.
//!
//! # Invariants
//!
//! 1. `get()` always returns a value consistent with the current state of all
//!    dependencies (no stale reads after a dependency mutation completes).
//! 2. The compute function is called at most once per dependency change cycle
//!    (memoization), and never before the first read.
//! 3. If no dependency has changed, `get()` returns the cached value.
//! 4. [`version`](Computed::version) increments by exactly 1 per
//!    recomputation. Downstream effects only consider a computed value
//!    changed when the recomputed result differs from the cached one.
//!
//! # Failure Modes
//!
//! - **Compute function panics**: the dirty flag stays set so the next
//!   `get()` will retry.
//! - **Reading itself**: a compute function that reads its own `Computed`
//!   panics on the re-entrant borrow.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::{self, NodeId, Source, Subscriber, Subscribers};

struct ComputedNode<T> {
    id: NodeId,
    compute: Box<dyn Fn() -> T>,
    /// Cached result (None only before first computation).
    cached: RefCell<Option<T>>,
    dirty: Cell<bool>,
    /// Recomputation count.
    evaluations: Cell<u64>,
    /// Bumped only when a recomputation produced a different value.
    changes: Cell<u64>,
    sources: RefCell<Vec<Rc<dyn Source>>>,
    subscribers: Subscribers,
    this: Weak<ComputedNode<T>>,
}

impl<T: Clone + PartialEq + 'static> ComputedNode<T> {
    fn recompute_if_dirty(&self) {
        if !self.dirty.get() && self.cached.borrow().is_some() {
            return;
        }
        for source in self.sources.take() {
            source.unsubscribe(self.id);
        }
        let Some(this) = self.this.upgrade() else {
            return;
        };
        let observer: Rc<dyn Subscriber> = this;
        let value = runtime::with_observer(Some(observer), || (self.compute)());

        let changed = self.cached.borrow().as_ref() != Some(&value);
        if changed {
            self.changes.set(self.changes.get() + 1);
        }
        *self.cached.borrow_mut() = Some(value);
        self.dirty.set(false);
        self.evaluations.set(self.evaluations.get() + 1);
    }
}

impl<T: Clone + PartialEq + 'static> Source for ComputedNode<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.changes.get()
    }

    fn refresh(&self) {
        self.recompute_if_dirty();
    }

    fn unsubscribe(&self, subscriber: NodeId) {
        self.subscribers.remove(subscriber);
    }
}

impl<T: Clone + PartialEq + 'static> Subscriber for ComputedNode<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn notify(&self) {
        // Already dirty means every subscriber has heard since the last read.
        if self.dirty.replace(true) {
            return;
        }
        self.subscribers.notify_all();
    }

    fn record_source(&self, source: Rc<dyn Source>) {
        let mut sources = self.sources.borrow_mut();
        if !sources.iter().any(|existing| existing.id() == source.id()) {
            sources.push(source);
        }
    }
}

impl<T> Drop for ComputedNode<T> {
    fn drop(&mut self) {
        for source in self.sources.get_mut().drain(..) {
            source.unsubscribe(self.id);
        }
    }
}

/// A lazily-evaluated, memoized value derived from other reactive values.
///
/// Cloning a `Computed` creates a new handle to the **same** inner state.
pub struct Computed<T> {
    node: Rc<ComputedNode<T>>,
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Computed")
            .field("cached", &*self.node.cached.borrow())
            .field("dirty", &self.node.dirty.get())
            .field("version", &self.node.evaluations.get())
            .finish()
    }
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    /// Create a computed value. Nothing runs until the first read.
    #[must_use]
    pub fn new(compute: impl Fn() -> T + 'static) -> Self {
        Self {
            node: Rc::new_cyclic(|this| ComputedNode {
                id: runtime::next_id(),
                compute: Box::new(compute),
                cached: RefCell::new(None),
                dirty: Cell::new(true),
                evaluations: Cell::new(0),
                changes: Cell::new(0),
                sources: RefCell::new(Vec::new()),
                subscribers: Subscribers::default(),
                this: this.clone(),
            }),
        }
    }

    /// A computed value that never changes.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self::new(move || value.clone())
    }

    /// Get the current value, recomputing if any dependency has changed.
    #[must_use]
    pub fn get(&self) -> T {
        self.node.recompute_if_dirty();
        runtime::track(&self.node, &self.node.subscribers);
        self.node.cached.borrow().clone().unwrap_or_else(|| (self.node.compute)())
    }

    /// Access the current value by reference without cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.node.recompute_if_dirty();
        runtime::track(&self.node, &self.node.subscribers);
        match self.node.cached.borrow().as_ref() {
            Some(value) => f(value),
            None => f(&(self.node.compute)()),
        }
    }

    /// Get the current value without registering a dependency.
    #[must_use]
    pub fn peek(&self) -> T {
        runtime::untrack(|| self.get())
    }

    /// Whether the cached value is stale.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.node.dirty.get()
    }

    /// Force invalidation of the cached value. The next `get()` will
    /// recompute and dependent effects are scheduled.
    pub fn invalidate(&self) {
        self.node.dirty.set(true);
        runtime::batch(|| self.node.subscribers.notify_all());
    }

    /// Current version number. Increments by 1 on each recomputation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.node.evaluations.get()
    }

    /// Number of live computations currently depending on this value.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.node.subscribers.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Observable;

    #[test]
    fn single_dep_computed() {
        let source = Observable::new(10);
        let source_in = source.clone();
        let computed = Computed::new(move || source_in.get() * 2);

        assert_eq!(computed.get(), 20);
        assert_eq!(computed.version(), 1);

        source.set(5);
        assert!(computed.is_dirty());
        assert_eq!(computed.get(), 10);
        assert_eq!(computed.version(), 2);
    }

    #[test]
    fn multi_dep_computed() {
        let width = Observable::new(10);
        let height = Observable::new(20);
        let (w, h) = (width.clone(), height.clone());
        let area = Computed::new(move || w.get() * h.get());

        assert_eq!(area.get(), 200);

        width.set(5);
        assert_eq!(area.get(), 100);

        height.set(30);
        assert_eq!(area.get(), 150);
    }

    #[test]
    fn lazy_evaluation() {
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);

        let source = Observable::new(42);
        let source_clone = source.clone();
        let computed = Computed::new(move || {
            count_clone.set(count_clone.get() + 1);
            source_clone.get() * 2
        });

        // Not computed yet.
        assert_eq!(compute_count.get(), 0);

        assert_eq!(computed.get(), 84);
        assert_eq!(compute_count.get(), 1);

        // Cached.
        assert_eq!(computed.get(), 84);
        assert_eq!(compute_count.get(), 1);
    }

    #[test]
    fn memoization_across_changes() {
        let compute_count = Rc::new(Cell::new(0u32));
        let count_clone = Rc::clone(&compute_count);

        let source = Observable::new(10);
        let source_in = source.clone();
        let computed = Computed::new(move || {
            count_clone.set(count_clone.get() + 1);
            source_in.get() * 2
        });

        assert_eq!(computed.get(), 20);
        assert_eq!(computed.get(), 20);
        assert_eq!(compute_count.get(), 1);

        // Two writes, one read: one recompute.
        source.set(20);
        source.set(30);
        assert_eq!(computed.get(), 60);
        assert_eq!(compute_count.get(), 2);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let source = Observable::new(5);
        let source_in = source.clone();
        let computed = Computed::new(move || source_in.get());

        assert_eq!(computed.get(), 5);
        computed.invalidate();
        assert!(computed.is_dirty());
        assert_eq!(computed.get(), 5);
        assert_eq!(computed.version(), 2);
    }

    #[test]
    fn with_access() {
        let source = Observable::new(vec![1, 2, 3]);
        let source_in = source.clone();
        let computed = Computed::new(move || source_in.with(|v| v.iter().sum::<i32>()));
        assert_eq!(computed.with(|sum| *sum), 6);
    }

    #[test]
    fn diamond_dependency() {
        // A -> B, A -> C, (B, C) -> D
        let a = Observable::new(10);
        let (a1, a2) = (a.clone(), a.clone());
        let b = Computed::new(move || a1.get() + 1);
        let c = Computed::new(move || a2.get() * 2);
        let (b_in, c_in) = (b.clone(), c.clone());
        let d = Computed::new(move || b_in.get() + c_in.get());

        assert_eq!(d.get(), 31);
        a.set(5);
        assert_eq!(d.get(), 16);
    }

    #[test]
    fn dynamic_dependencies_are_re_recorded() {
        let use_left = Observable::new(true);
        let left = Observable::new(1);
        let right = Observable::new(2);
        let (u, l, r) = (use_left.clone(), left.clone(), right.clone());
        let picked = Computed::new(move || if u.get() { l.get() } else { r.get() });

        assert_eq!(picked.get(), 1);
        assert_eq!(right.subscriber_count(), 0);

        use_left.set(false);
        assert_eq!(picked.get(), 2);
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);
    }

    #[test]
    fn constant_never_dirties() {
        let constant = Computed::constant(false);
        assert!(!constant.get());
        assert!(!constant.is_dirty());
        assert_eq!(constant.version(), 1);
    }

    #[test]
    fn peek_does_not_subscribe() {
        let source = Observable::new(1);
        let source_in = source.clone();
        let computed = Computed::new(move || source_in.get());
        let computed_in = computed.clone();
        let outer = Computed::new(move || computed_in.peek());
        assert_eq!(outer.get(), 1);
        assert_eq!(computed.subscriber_count(), 0);
    }

    #[test]
    fn debug_format() {
        let computed = Computed::constant(42);
        let _ = computed.get();
        let dbg = format!("{computed:?}");
        assert!(dbg.contains("Computed"));
        assert!(dbg.contains("42"));
    }

    #[test]
    fn many_updates_version_monotonic() {
        let source = Observable::new(0);
        let source_in = source.clone();
        let computed = Computed::new(move || source_in.get());

        for i in 1..=50 {
            source.set(i);
            let _ = computed.get();
        }
        // Initial read never happened; 50 reads after 50 changes.
        assert_eq!(computed.version(), 50);
    }
}
