//! Declaration nodes
//!
//! The engine never looks at declaration syntax. It only walks a tree of
//! values through the accessors on [`Node`], each node remembering where in
//! the source document it came from so errors can point back at it.

use serde_json::{Map, Value};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Location of a node within a declaration document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchor {
    source: Option<Arc<Path>>,
    path: String,
}

impl Anchor {
    /// Anchor for the root of a document loaded from `source`.
    pub fn new(source: Option<&Path>) -> Self {
        Self {
            source: source.map(Arc::from),
            path: String::new(),
        }
    }

    /// Anchor of a child reached through a mapping key.
    pub fn key(&self, name: &str) -> Self {
        let path = if self.path.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.path, name)
        };
        Self {
            source: self.source.clone(),
            path,
        }
    }

    /// Anchor of a child reached through a list index.
    pub fn index(&self, index: usize) -> Self {
        Self {
            source: self.source.clone(),
            path: format!("{}[{}]", self.path, index),
        }
    }

    /// The source document, if the declaration was loaded from a file.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Key path from the document root.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source, self.path.is_empty()) {
            (Some(source), false) => write!(f, "{}: {}", source.display(), self.path),
            (Some(source), true) => write!(f, "{}", source.display()),
            (None, false) => write!(f, "{}", self.path),
            (None, true) => write!(f, "<declaration>"),
        }
    }
}

/// Errors raised when a node is read in a way its value does not support
#[derive(Debug, Error)]
pub enum NodeError {
    /// The key or index does not exist
    #[error("no value at {0}")]
    NoMatching(Anchor),

    /// The value has a different shape than requested
    #[error("expected {expected} at {anchor}, found {found}")]
    Type {
        /// Where the value lives
        anchor: Anchor,
        /// Shape the caller asked for
        expected: &'static str,
        /// Shape that was found
        found: &'static str,
    },
}

impl NodeError {
    /// Location of the offending node.
    pub fn anchor(&self) -> &Anchor {
        match self {
            Self::NoMatching(anchor) | Self::Type { anchor, .. } => anchor,
        }
    }
}

/// A value in a declaration tree together with its location
#[derive(Debug, Clone)]
pub struct Node {
    value: Option<Value>,
    anchor: Anchor,
}

impl Node {
    /// Wrap a value found at `anchor`.
    pub fn new(value: Value, anchor: Anchor) -> Self {
        let value = if value.is_null() { None } else { Some(value) };
        Self { value, anchor }
    }

    /// Root node of a document loaded from `source`.
    pub fn root(value: Value, source: Option<&Path>) -> Self {
        Self::new(value, Anchor::new(source))
    }

    /// A node for a key that was not declared.
    pub fn missing(anchor: Anchor) -> Self {
        Self {
            value: None,
            anchor,
        }
    }

    /// Where this node lives in the document.
    pub fn anchor(&self) -> &Anchor {
        &self.anchor
    }

    /// Whether the node has no value (absent key or explicit null).
    pub fn is_missing(&self) -> bool {
        self.value.is_none()
    }

    /// Whether the node holds a mapping.
    pub fn is_mapping(&self) -> bool {
        matches!(self.value, Some(Value::Object(_)))
    }

    /// Whether the node holds a list.
    pub fn is_list(&self) -> bool {
        matches!(self.value, Some(Value::Array(_)))
    }

    /// The raw value, or `NoMatching` if the node is missing.
    pub fn resolve(&self) -> Result<&Value, NodeError> {
        self.value
            .as_ref()
            .ok_or_else(|| NodeError::NoMatching(self.anchor.clone()))
    }

    /// Child node for `name`. Never fails: a missing key yields a missing node.
    ///
    /// `foo_bar` also matches a declared `foo-bar`.
    pub fn get_key(&self, name: &str) -> Self {
        let anchor = self.anchor.key(name);
        let Some(Value::Object(map)) = &self.value else {
            return Self::missing(anchor);
        };
        let found = map
            .get(name)
            .or_else(|| map.get(&name.replace('_', "-")))
            .cloned();
        match found {
            Some(value) => Self::new(value, anchor),
            None => Self::missing(anchor),
        }
    }

    /// Keys of a mapping node, with `-` normalised to `_`.
    pub fn keys(&self) -> Result<Vec<String>, NodeError> {
        Ok(self
            .mapping()?
            .keys()
            .map(|k| k.replace('-', "_"))
            .collect())
    }

    /// Children of a list node, in declaration order.
    pub fn get_iterable(&self) -> Result<Vec<Self>, NodeError> {
        match self.resolve()? {
            Value::Array(items) => Ok(items
                .iter()
                .enumerate()
                .map(|(i, v)| Self::new(v.clone(), self.anchor.index(i)))
                .collect()),
            other => Err(self.type_error("list", other)),
        }
    }

    /// Scalar value as a string; numbers and booleans are rendered as text.
    pub fn as_string(&self) -> Result<String, NodeError> {
        match self.resolve()? {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            other => Err(self.type_error("string", other)),
        }
    }

    /// Integer value; numeric strings are accepted.
    pub fn as_int(&self) -> Result<i64, NodeError> {
        let value = self.resolve()?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        parsed.ok_or_else(|| self.type_error("integer", value))
    }

    /// Boolean value.
    pub fn as_bool(&self) -> Result<bool, NodeError> {
        match self.resolve()? {
            Value::Bool(b) => Ok(*b),
            other => Err(self.type_error("boolean", other)),
        }
    }

    /// List value.
    pub fn as_list(&self) -> Result<Vec<Value>, NodeError> {
        match self.resolve()? {
            Value::Array(items) => Ok(items.clone()),
            other => Err(self.type_error("list", other)),
        }
    }

    /// Mapping value.
    pub fn as_dict(&self) -> Result<Map<String, Value>, NodeError> {
        self.mapping().cloned()
    }

    fn mapping(&self) -> Result<&Map<String, Value>, NodeError> {
        match self.resolve()? {
            Value::Object(map) => Ok(map),
            other => Err(self.type_error("mapping", other)),
        }
    }

    fn type_error(&self, expected: &'static str, found: &Value) -> NodeError {
        NodeError::Type {
            anchor: self.anchor.clone(),
            expected,
            found: describe(found),
        }
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "mapping",
    }
}
