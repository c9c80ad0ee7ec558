//! # Path Expressions
//!
//! A small dotted-path language for reading and writing nested JSON values.
//!
//! ## Syntax
//!
//! - `a.b.c` - object keys
//! - `items[2]` - list index (reads; writes pad the list with `null` up to
//!   [`MAX_WRITE_INDEX`])
//! - `items[]` - ensure a list; writes target the first element, or store the
//!   whole list when it is the final segment. Reads treat it like `[*]`
//! - `items[*]` - map the rest of the path over every element (read-only).
//!   `[i]` is accepted as an alias
//!
//! Reads are total and never fail. Writes create missing objects and lists
//! but refuse to turn an existing scalar into a container.
//!
//! Parsed expressions are cached per distinct path string, so repeated
//! bindings against the same field do not re-parse.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::codec::value_to_text;

/// Largest list index a write may pad up to.
pub const MAX_WRITE_INDEX: usize = 65_535;

static PATH_CACHE: Lazy<RwLock<HashMap<String, Arc<PathExpression>>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Errors raised while parsing or writing a path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("invalid segment '{segment}' in path '{path}'")]
    Syntax { path: String, segment: String },

    #[error("cannot write path '{path}': {reason}")]
    Structural { path: String, reason: String },
}

/// How a segment addresses the value stored under its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// Plain `key`.
    Key,
    /// `key[N]`.
    Index(usize),
    /// `key[]`.
    Append,
    /// `key[*]`.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSegment {
    pub key: String,
    pub selector: Selector,
}

/// An immutable, parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpression {
    source: String,
    segments: Vec<PathSegment>,
}

impl PathExpression {
    /// Parses `path`, reusing a previously parsed expression for the same string.
    pub fn parse(path: &str) -> Result<Arc<PathExpression>, PathError> {
        if let Some(cached) = PATH_CACHE.read().unwrap_or_else(PoisonError::into_inner).get(path) {
            return Ok(Arc::clone(cached));
        }

        let expression = Arc::new(Self::parse_uncached(path)?);
        PATH_CACHE
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(path.to_string())
            .or_insert_with(|| Arc::clone(&expression));
        Ok(expression)
    }

    fn parse_uncached(path: &str) -> Result<PathExpression, PathError> {
        let normalized = path.trim().replace("[i]", "[*]");
        if normalized.is_empty() {
            return Ok(PathExpression {
                source: normalized,
                segments: Vec::new(),
            });
        }

        let segments = normalized
            .split('.')
            .map(|segment| parse_segment(segment).ok_or_else(|| PathError::Syntax {
                path: path.to_string(),
                segment: segment.to_string(),
            }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PathExpression {
            source: normalized,
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// True for the empty path, which addresses the root itself.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Reads the value at this path. Missing keys, wrong container types and
    /// out-of-range indices yield `None`.
    pub fn get(&self, root: &Value) -> Option<Value> {
        select(root, &self.segments)
    }

    /// Writes `value` at this path, creating intermediate containers.
    ///
    /// With `concat`, a non-empty string already at the target gets the text
    /// form of `value` appended after a blank line.
    pub fn set(&self, root: &mut Value, value: Value, concat: bool) -> Result<(), PathError> {
        let Some((last, parents)) = self.segments.split_last() else {
            return Err(self.structural("an empty path cannot be written"));
        };
        if let Some(segment) = self.segments.iter().find(|segment| segment.selector == Selector::Wildcard) {
            return Err(self.wildcard_write(&segment.key));
        }

        let mut slot = root;
        for segment in parents {
            slot = self.descend(slot, segment)?;
        }
        self.write(slot, last, value, concat)
    }

    fn descend<'a>(&self, slot: &'a mut Value, segment: &PathSegment) -> Result<&'a mut Value, PathError> {
        let map = self.object_at(slot, &segment.key)?;
        let child = map.entry(segment.key.clone()).or_insert(Value::Null);
        match segment.selector {
            Selector::Key => Ok(child),
            Selector::Index(index) => {
                let list = self.list_at(child, &segment.key)?;
                self.pad_to(list, index)?;
                Ok(&mut list[index])
            }
            Selector::Append => {
                let list = self.list_at(child, &segment.key)?;
                if list.is_empty() {
                    list.push(Value::Object(Map::new()));
                }
                Ok(&mut list[0])
            }
            Selector::Wildcard => Err(self.wildcard_write(&segment.key)),
        }
    }

    fn write(&self, slot: &mut Value, segment: &PathSegment, value: Value, concat: bool) -> Result<(), PathError> {
        let map = self.object_at(slot, &segment.key)?;
        let child = map.entry(segment.key.clone()).or_insert(Value::Null);
        match segment.selector {
            Selector::Key => {
                assign(child, value, concat);
                Ok(())
            }
            Selector::Index(index) => {
                let list = self.list_at(child, &segment.key)?;
                self.pad_to(list, index)?;
                assign(&mut list[index], value, concat);
                Ok(())
            }
            Selector::Append => {
                let list = self.list_at(child, &segment.key)?;
                *list = match value {
                    Value::Array(items) => items,
                    other => vec![other],
                };
                Ok(())
            }
            Selector::Wildcard => Err(self.wildcard_write(&segment.key)),
        }
    }

    fn object_at<'a>(&self, slot: &'a mut Value, key: &str) -> Result<&'a mut Map<String, Value>, PathError> {
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => Ok(map),
            other => Err(self.structural(format!("cannot look up key '{key}' in a {}", kind_of(other)))),
        }
    }

    fn list_at<'a>(&self, slot: &'a mut Value, key: &str) -> Result<&'a mut Vec<Value>, PathError> {
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => Ok(items),
            other => Err(self.structural(format!("expected a list at '{key}', found a {}", kind_of(other)))),
        }
    }

    fn pad_to(&self, list: &mut Vec<Value>, index: usize) -> Result<(), PathError> {
        let len = index
            .checked_add(1)
            .filter(|_| index <= MAX_WRITE_INDEX)
            .ok_or_else(|| self.structural(format!("index {index} exceeds the write limit of {MAX_WRITE_INDEX}")))?;
        if list.len() < len {
            list.resize(len, Value::Null);
        }
        Ok(())
    }

    fn structural(&self, reason: impl Into<String>) -> PathError {
        PathError::Structural {
            path: self.source.clone(),
            reason: reason.into(),
        }
    }

    fn wildcard_write(&self, key: &str) -> PathError {
        self.structural(format!("wildcard segment '{key}[*]' is read-only"))
    }
}

/// Reads `path` from `root`; malformed paths read as absent.
pub fn get_path(root: &Value, path: &str) -> Option<Value> {
    PathExpression::parse(path).ok()?.get(root)
}

/// Writes `value` at `path` in `root`. See [`PathExpression::set`].
pub fn set_path(root: &mut Value, path: &str, value: Value, concat: bool) -> Result<(), PathError> {
    PathExpression::parse(path)?.set(root, value, concat)
}

fn parse_segment(segment: &str) -> Option<PathSegment> {
    let (key, selector) = match segment.find('[') {
        None => (segment, Selector::Key),
        Some(open) => {
            let inner = segment[open..].strip_prefix('[')?.strip_suffix(']')?;
            if inner.contains(['[', ']']) {
                return None;
            }
            let selector = match inner.trim() {
                "" => Selector::Append,
                "*" => Selector::Wildcard,
                digits if digits.bytes().all(|byte| byte.is_ascii_digit()) => Selector::Index(digits.parse().ok()?),
                _ => return None,
            };
            (&segment[..open], selector)
        }
    };

    let key = key.trim();
    if key.is_empty() || key.contains(']') {
        return None;
    }
    Some(PathSegment {
        key: key.to_string(),
        selector,
    })
}

fn select(value: &Value, segments: &[PathSegment]) -> Option<Value> {
    let Some((segment, rest)) = segments.split_first() else {
        return Some(value.clone());
    };

    let child = value.as_object()?.get(&segment.key)?;
    match segment.selector {
        Selector::Key => select(child, rest),
        Selector::Index(index) => select(child.as_array()?.get(index)?, rest),
        Selector::Append | Selector::Wildcard => {
            let items = child.as_array()?;
            Some(Value::Array(
                items.iter().map(|item| select(item, rest).unwrap_or(Value::Null)).collect(),
            ))
        }
    }
}

fn assign(target: &mut Value, value: Value, concat: bool) {
    if concat
        && let Value::String(existing) = target
        && !existing.is_empty()
    {
        let addition = value_to_text(&value);
        if !addition.is_empty() {
            existing.push_str("\n\n");
            existing.push_str(&addition);
        }
        return;
    }
    *target = value;
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}
