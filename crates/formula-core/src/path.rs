#![forbid(unsafe_code)]

//! Dot/bracket field paths.
//!
//! `userinfo.phones[0].number` parses into the segments
//! `Key("userinfo")`, `Key("phones")`, `Index(0)`, `Key("number")`.
//! Field paths proper (the ids of nested fields joined with `.`) only ever
//! contain keys; indices address positions inside a field's JSON value.

use std::fmt;

use serde_json::Value;

use crate::error::{FormulaError, Result};

/// One step of a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Split `path` into segments.
///
/// Empty keys (`a..b`, a leading dot) and malformed brackets are rejected
/// with `PathResolution` naming the offending piece.
pub fn parse(path: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    for part in path.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(open) => part.split_at(open),
            None => (part, ""),
        };
        if key.is_empty() && (segments.is_empty() || rest.is_empty()) {
            return Err(FormulaError::path(path, part));
        }
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        }
        while !rest.is_empty() {
            let close = rest
                .find(']')
                .filter(|_| rest.starts_with('['))
                .ok_or_else(|| FormulaError::path(path, rest))?;
            let index = rest[1..close]
                .parse::<usize>()
                .map_err(|_| FormulaError::path(path, &rest[..=close]))?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }
    Ok(segments)
}

/// Canonical field path for a run of key segments (`a.b.c`).
///
/// Returns `None` once an index segment is reached.
pub(crate) fn key_prefix(segments: &[Segment]) -> Option<String> {
    let mut out = String::new();
    for segment in segments {
        let Segment::Key(key) = segment else {
            return None;
        };
        if !out.is_empty() {
            out.push('.');
        }
        out.push_str(key);
    }
    Some(out)
}

/// Join a parent path and a child id.
#[must_use]
pub fn join(parent: Option<&str>, id: &str) -> String {
    match parent {
        Some(parent) if !parent.is_empty() => format!("{parent}.{id}"),
        _ => id.to_string(),
    }
}

/// Walk `segments` into `value`.
///
/// A missing final segment yields `Null`; a missing intermediate segment
/// (including one that lands on a non-container) is a `PathResolution`
/// error for `path`.
pub fn descend(value: &Value, segments: &[Segment], path: &str) -> Result<Value> {
    let mut current = value;
    for (i, segment) in segments.iter().enumerate() {
        let next = match segment {
            Segment::Key(key) => current.get(key.as_str()),
            Segment::Index(index) => current.get(*index),
        };
        match next {
            Some(next) => current = next,
            None if i + 1 == segments.len() => return Ok(Value::Null),
            None => return Err(FormulaError::path(path, segment.to_string())),
        }
    }
    Ok(current.clone())
}

/// Write `new` at `segments` inside `root`, creating intermediate objects.
pub(crate) fn insert(root: &mut Value, segments: &[Segment], new: Value) {
    let Some((last, parents)) = segments.split_last() else {
        *root = new;
        return;
    };
    let mut current = root;
    for segment in parents {
        current = child_mut(current, segment);
    }
    *child_mut(current, last) = new;
}

fn child_mut<'a>(value: &'a mut Value, segment: &Segment) -> &'a mut Value {
    match segment {
        Segment::Key(key) => {
            if !value.is_object() {
                *value = Value::Object(serde_json::Map::new());
            }
            let Value::Object(map) = value else {
                unreachable!("just replaced with an object")
            };
            map.entry(key.clone()).or_insert(Value::Null)
        }
        Segment::Index(index) => {
            if !value.is_array() {
                *value = Value::Array(Vec::new());
            }
            let Value::Array(items) = value else {
                unreachable!("just replaced with an array")
            };
            if items.len() <= *index {
                items.resize(index + 1, Value::Null);
            }
            &mut items[*index]
        }
    }
}
