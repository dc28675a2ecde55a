#![forbid(unsafe_code)]

//! Mutable reactive cells.
//!
//! An [`Observable<T>`] is the leaf of every dependency graph. Reading it
//! with [`get`](Observable::get) or [`with`](Observable::with) inside a
//! tracked computation registers that computation as a subscriber; writing
//! it with [`set`](Observable::set) pushes an invalidation to every
//! subscriber.
//!
//! # Invariants
//!
//! 1. Version increments exactly once per mutation that changes the value.
//! 2. Setting a value equal to the current value is a no-op (no version
//!    bump, no notifications).
//! 3. Notifications are delivered inside an implicit batch, so effects run
//!    after the write has fully propagated.
//! 4. [`peek`](Observable::peek) never registers a dependency.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::runtime::{self, NodeId, Source, Subscribers};

pub(crate) struct ObservableNode<T> {
    id: NodeId,
    value: RefCell<T>,
    version: Cell<u64>,
    subscribers: Subscribers,
}

impl<T: 'static> Source for ObservableNode<T> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn version(&self) -> u64 {
        self.version.get()
    }

    fn refresh(&self) {}

    fn unsubscribe(&self, subscriber: NodeId) {
        self.subscribers.remove(subscriber);
    }
}

/// A shared, version-tracked mutable value.
///
/// Cloning an `Observable` creates a new handle to the **same** cell.
pub struct Observable<T> {
    node: Rc<ObservableNode<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("value", &*self.node.value.borrow())
            .field("version", &self.node.version.get())
            .finish()
    }
}

impl<T: Default + Clone + PartialEq + 'static> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + PartialEq + 'static> Observable<T> {
    /// Create a cell holding `value`.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            node: Rc::new(ObservableNode {
                id: runtime::next_id(),
                value: RefCell::new(value),
                version: Cell::new(0),
                subscribers: Subscribers::default(),
            }),
        }
    }

    /// Read the value, registering a dependency when tracked.
    #[must_use]
    pub fn get(&self) -> T {
        runtime::track(&self.node, &self.node.subscribers);
        self.node.value.borrow().clone()
    }

    /// Read the value by reference, registering a dependency when tracked.
    ///
    /// # Panics
    ///
    /// Panics if `f` writes to this same cell.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        runtime::track(&self.node, &self.node.subscribers);
        f(&self.node.value.borrow())
    }

    /// Read the value without registering a dependency.
    #[must_use]
    pub fn peek(&self) -> T {
        self.node.value.borrow().clone()
    }

    /// Replace the value. Returns `false` (and notifies nobody) when the new
    /// value equals the current one.
    pub fn set(&self, value: T) -> bool {
        let unchanged = *self.node.value.borrow() == value;
        if unchanged {
            return false;
        }
        *self.node.value.borrow_mut() = value;
        self.node.version.set(self.node.version.get() + 1);
        runtime::batch(|| self.node.subscribers.notify_all());
        true
    }

    /// Mutate a copy of the value and store it through [`set`](Self::set).
    pub fn update(&self, f: impl FnOnce(&mut T)) -> bool {
        let mut next = self.peek();
        f(&mut next);
        self.set(next)
    }

    /// Number of changing writes since creation.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.node.version.get()
    }

    /// Number of live computations currently depending on this cell.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.node.subscribers.len()
    }

    /// Whether two handles point at the same cell.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.node, &other.node)
    }
}
