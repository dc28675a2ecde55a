#![forbid(unsafe_code)]

//! Side-effecting reactions.
//!
//! An [`Effect`] runs its body immediately, records every cell and derived
//! value the body read, and re-runs whenever one of them changes, until it
//! is disposed.
//!
//! # Scheduling
//!
//! A change never runs an effect inline. The effect is queued and the queue
//! is drained when the outermost [`batch`](super::batch) exits (every
//! [`Observable::set`](super::Observable::set) opens an implicit batch).
//! When its turn comes the scheduler re-runs the body only if the effect is
//! still **active** and still **dirty**: at least one recorded source has a
//! version different from the one seen during the previous run. Two
//! notifications for the same effect inside one batch therefore produce one
//! run, and an effect whose derived inputs recomputed to the same value does
//! not run at all.
//!
//! # Ownership
//!
//! Sources hold subscribers weakly. Dropping the last [`Effect`] handle
//! disposes the effect.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::runtime::{self, NodeId, Source, Subscriber};

type Body = Box<dyn FnMut()>;

pub(crate) struct EffectNode {
    id: NodeId,
    body: RefCell<Option<Body>>,
    active: Cell<bool>,
    queued: Cell<bool>,
    runs: Cell<u64>,
    /// Sources read during the last run with the version seen at read time.
    sources: RefCell<Vec<(Rc<dyn Source>, u64)>>,
    this: Weak<EffectNode>,
}

impl EffectNode {
    pub(crate) fn node_id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn clear_queued(&self) {
        self.queued.set(false);
    }

    fn is_dirty(&self) -> bool {
        let sources: Vec<(Rc<dyn Source>, u64)> = self.sources.borrow().clone();
        sources.iter().any(|(source, seen)| {
            source.refresh();
            source.version() != *seen
        })
    }

    /// Scheduler entry point: run only while active and dirty.
    pub(crate) fn run_scheduled(&self) {
        self.queued.set(false);
        if !self.active.get() || !self.is_dirty() {
            return;
        }
        self.run();
    }

    fn run(&self) {
        // Taken out for the duration of the call; `None` means re-entrant.
        let Some(mut body) = self.body.borrow_mut().take() else {
            return;
        };
        for (source, _) in self.sources.take() {
            source.unsubscribe(self.id);
        }
        if let Some(this) = self.this.upgrade() {
            let observer: Rc<dyn Subscriber> = this;
            runtime::with_observer(Some(observer), || runtime::batch(|| body()));
        }
        self.runs.set(self.runs.get() + 1);
        if self.active.get() {
            *self.body.borrow_mut() = Some(body);
        }
    }

    fn dispose(&self) {
        if !self.active.replace(false) {
            return;
        }
        for (source, _) in self.sources.take() {
            source.unsubscribe(self.id);
        }
        let body = self.body.borrow_mut().take();
        drop(body);
    }
}

impl Subscriber for EffectNode {
    fn id(&self) -> NodeId {
        self.id
    }

    fn notify(&self) {
        if !self.active.get() || self.queued.replace(true) {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            runtime::enqueue(this);
        }
    }

    fn record_source(&self, source: Rc<dyn Source>) {
        let mut sources = self.sources.borrow_mut();
        if !sources.iter().any(|(existing, _)| existing.id() == source.id()) {
            let version = source.version();
            sources.push((source, version));
        }
    }
}

impl Drop for EffectNode {
    fn drop(&mut self) {
        for (source, _) in self.sources.get_mut().drain(..) {
            source.unsubscribe(self.id);
        }
    }
}

/// A tracked, auto-re-running side effect.
///
/// Cloning an `Effect` creates a new handle to the same reaction.
#[derive(Clone)]
#[must_use = "dropping the last handle disposes the effect"]
pub struct Effect {
    node: Rc<EffectNode>,
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.node.id)
            .field("active", &self.node.active.get())
            .field("runs", &self.node.runs.get())
            .field("sources", &self.node.sources.borrow().len())
            .finish()
    }
}

impl Effect {
    /// Create an effect and run it once immediately.
    pub fn new(body: impl FnMut() + 'static) -> Self {
        let node = Rc::new_cyclic(|this| EffectNode {
            id: runtime::next_id(),
            body: RefCell::new(Some(Box::new(body))),
            active: Cell::new(true),
            queued: Cell::new(false),
            runs: Cell::new(0),
            sources: RefCell::new(Vec::new()),
            this: this.clone(),
        });
        runtime::batch(|| node.run());
        Self { node }
    }

    /// Stop the effect. It will never run again and its body is dropped.
    pub fn dispose(&self) {
        self.node.dispose();
    }

    /// Whether the effect is still scheduled on change.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.node.active.get()
    }

    /// Whether any dependency changed since the last run.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.node.is_dirty()
    }

    /// Re-run the body now, regardless of dirtiness. No-op once disposed.
    pub fn run(&self) {
        if self.node.active.get() {
            self.node.run();
        }
    }

    /// How many times the body has run, including the initial run.
    #[must_use]
    pub fn run_count(&self) -> u64 {
        self.node.runs.get()
    }

    /// Number of sources recorded during the last run.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.node.sources.borrow().len()
    }
}
