#![forbid(unsafe_code)]

//! The field tree and its path index.
//!
//! The graph owns the root fields; each field owns its children. A flat
//! `path → field` index gives O(1) lookup and is rebuilt after every
//! structural change. Structural changes also bump a reactive structure
//! version that every path read depends on, so relations re-resolve their
//! paths after fields are added or removed.

use std::cell::RefCell;
use std::fmt;

use ahash::AHashMap;
use formula_runtime::{Observable, untrack};
use serde_json::{Map, Value};

use crate::error::{FormulaError, Result};
use crate::field::Field;
use crate::path;

pub struct FieldGraph {
    roots: RefCell<Vec<Field>>,
    index: RefCell<AHashMap<String, Field>>,
    structure: Observable<u64>,
}

impl Default for FieldGraph {
    fn default() -> Self {
        Self {
            roots: RefCell::new(Vec::new()),
            index: RefCell::new(AHashMap::new()),
            structure: Observable::new(0),
        }
    }
}

impl fmt::Debug for FieldGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldGraph")
            .field("paths", &self.paths())
            .field("structure", &self.structure.peek())
            .finish()
    }
}

impl FieldGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn roots(&self) -> Vec<Field> {
        self.roots.borrow().clone()
    }

    /// Number of indexed fields (all levels).
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.borrow().is_empty()
    }

    /// Number of structural changes so far. Tracked.
    #[must_use]
    pub fn structure_version(&self) -> u64 {
        self.structure.get()
    }

    pub fn get_field(&self, path: &str) -> Result<Field> {
        self.index
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| FormulaError::field_not_found(path))
    }

    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.index.borrow().contains_key(path)
    }

    /// Every field, depth first in declaration order.
    #[must_use]
    pub fn fields(&self) -> Vec<Field> {
        self.roots().iter().flat_map(Field::subtree).collect()
    }

    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        self.fields().iter().map(|field| field.path().to_string()).collect()
    }

    /// Fields whose own `hidden` flag and every ancestor's are false.
    /// Not tracked.
    #[must_use]
    pub fn visible_fields(&self) -> Vec<Field> {
        fn walk(field: &Field, out: &mut Vec<Field>) {
            if field.peek_hidden() {
                return;
            }
            out.push(field.clone());
            for child in field.children() {
                walk(&child, out);
            }
        }
        let mut out = Vec::new();
        for root in self.roots() {
            walk(&root, &mut out);
        }
        out
    }

    /// Attach a built subtree under `parent` (or as a root).
    pub(crate) fn insert(&self, parent: Option<&str>, field: Field) -> Result<()> {
        {
            let index = self.index.borrow();
            if let Some(taken) = field.subtree().iter().find(|node| index.contains_key(node.path())) {
                return Err(FormulaError::DuplicateField {
                    path: taken.path().to_string(),
                });
            }
        }
        match parent {
            Some(parent) => self.get_field(parent)?.push_child(field)?,
            None => self.roots.borrow_mut().push(field),
        }
        self.restructure();
        Ok(())
    }

    /// Detach the subtree at `path` and destroy it.
    pub(crate) fn remove(&self, path: &str) -> Result<Field> {
        let field = self.get_field(path)?;
        match field.parent_path() {
            Some(parent) => {
                self.get_field(parent)?.remove_child(field.id());
            }
            None => self.roots.borrow_mut().retain(|root| !root.ptr_eq(&field)),
        }
        field.destroy();
        self.restructure();
        Ok(field)
    }

    /// Destroy every field and empty the graph.
    pub(crate) fn clear(&self) {
        let roots = self.roots.take();
        for root in &roots {
            root.destroy();
        }
        self.restructure();
    }

    fn restructure(&self) {
        let index: AHashMap<String, Field> = self
            .fields()
            .into_iter()
            .map(|field| (field.path().to_string(), field))
            .collect();
        *self.index.borrow_mut() = index;
        let version = untrack(|| self.structure.get()) + 1;
        tracing::debug!(message = "formula.graph.restructure", fields = self.len(), version);
        self.structure.set(version);
    }

    /// Resolve a dot/bracket path against the live value tree. Tracked.
    ///
    /// The longest field path that prefixes `path` selects a field; the
    /// rest of `path` walks into that field's JSON value. A missing final
    /// segment reads as `null`, a missing intermediate one is a
    /// `PathResolution` error.
    pub fn resolve(&self, path: &str) -> Result<Value> {
        let _ = self.structure.get();
        let segments = path::parse(path)?;
        for len in (1..=segments.len()).rev() {
            let Some(prefix) = path::key_prefix(&segments[..len]) else {
                continue;
            };
            let field = self.index.borrow().get(&prefix).cloned();
            if let Some(field) = field {
                return path::descend(&field.value(), &segments[len..], path);
            }
        }
        match segments.as_slice() {
            [_] => Ok(Value::Null),
            [first, ..] => Err(FormulaError::path(path, first.to_string())),
            [] => Err(FormulaError::path(path, path)),
        }
    }

    /// The whole model as one object keyed by root ids. Tracked.
    #[must_use]
    pub fn value(&self) -> Value {
        let _ = self.structure.get();
        let object: Map<String, Value> = self
            .roots()
            .iter()
            .map(|root| (root.id().to_string(), root.value()))
            .collect();
        Value::Object(object)
    }
}
