#![forbid(unsafe_code)]

//! A value that may or may not be reactive.
//!
//! Configuration often accepts "a plain value, a cell, a derived value, or a
//! getter". [`MaybeReactive<T>`] names those four shapes as variants so that
//! consumers resolve them with one `match` instead of probing at runtime.

use std::fmt;
use std::rc::Rc;

use super::{Computed, Observable, untrack};

/// Plain value, cell, derived value, or getter closure.
pub enum MaybeReactive<T> {
    Plain(T),
    Observable(Observable<T>),
    Computed(Computed<T>),
    Getter(Rc<dyn Fn() -> T>),
}

impl<T: Clone> Clone for MaybeReactive<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Plain(value) => Self::Plain(value.clone()),
            Self::Observable(cell) => Self::Observable(cell.clone()),
            Self::Computed(derived) => Self::Computed(derived.clone()),
            Self::Getter(getter) => Self::Getter(Rc::clone(getter)),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for MaybeReactive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => f.debug_tuple("Plain").field(value).finish(),
            Self::Observable(cell) => f.debug_tuple("Observable").field(cell).finish(),
            Self::Computed(derived) => f.debug_tuple("Computed").field(derived).finish(),
            Self::Getter(_) => f.write_str("Getter(..)"),
        }
    }
}

impl<T: Clone + PartialEq + 'static> MaybeReactive<T> {
    /// Wrap a getter closure.
    pub fn getter(f: impl Fn() -> T + 'static) -> Self {
        Self::Getter(Rc::new(f))
    }

    /// Current value. Reactive variants register a dependency when tracked.
    #[must_use]
    pub fn resolve(&self) -> T {
        match self {
            Self::Plain(value) => value.clone(),
            Self::Observable(cell) => cell.get(),
            Self::Computed(derived) => derived.get(),
            Self::Getter(getter) => getter(),
        }
    }

    /// Current value without registering any dependency.
    #[must_use]
    pub fn peek(&self) -> T {
        untrack(|| self.resolve())
    }

    /// Whether reading this value can ever register a dependency.
    #[must_use]
    pub fn is_reactive(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }
}

impl<T> From<Observable<T>> for MaybeReactive<T> {
    fn from(cell: Observable<T>) -> Self {
        Self::Observable(cell)
    }
}

impl<T> From<Computed<T>> for MaybeReactive<T> {
    fn from(derived: Computed<T>) -> Self {
        Self::Computed(derived)
    }
}

impl From<bool> for MaybeReactive<bool> {
    fn from(value: bool) -> Self {
        Self::Plain(value)
    }
}
