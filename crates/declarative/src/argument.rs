//! Typed resource arguments
//!
//! Each resource type declares a static table of [`Field`]s. When a resource
//! is constructed every field is resolved once against the declaration node,
//! coerced to its [`ArgumentKind`] and stored as an [`Argument`]. A field that
//! is neither declared nor defaulted resolves to `None`.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::node::Node;

/// The type a field is coerced to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgumentKind {
    String,
    Integer,
    /// Unix permission style number, written in octal digits
    Octal,
    Boolean,
    DateTime,
    /// Absolute filesystem path
    FullPath,
    List,
    Dict,
}

/// Value used when a field is not declared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefaultValue {
    None,
    Str(&'static str),
    Int(i64),
    Bool(bool),
    EmptyList,
    EmptyDict,
}

/// One entry in a resource type's argument schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: ArgumentKind,
    pub default: DefaultValue,
    pub required: bool,
}

impl Field {
    pub const fn new(name: &'static str, kind: ArgumentKind) -> Self {
        Self {
            name,
            kind,
            default: DefaultValue::None,
            required: false,
        }
    }

    /// Mark the field as required: resolving it without a value or default
    /// is a parse error.
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn with_default(mut self, default: DefaultValue) -> Self {
        self.default = default;
        self
    }

    /// Resolve the field against the node holding its declared value.
    pub fn resolve(&self, node: &Node) -> Result<Option<Argument>> {
        if node.is_missing() {
            let value = self.default_argument();
            if value.is_none() && self.required {
                return Err(Error::parse_at(
                    format!("missing required argument '{}'", self.name),
                    node.anchor(),
                ));
            }
            return Ok(value);
        }

        let value = node.resolve()?;
        log::trace!("resolving {} as {:?} from {}", self.name, self.kind, value);
        coerce(self.kind, value)
            .map(Some)
            .map_err(|message| Error::parse_at(format!("{}: {}", self.name, message), node.anchor()))
    }

    fn default_argument(&self) -> Option<Argument> {
        match (self.default, self.kind) {
            (DefaultValue::None, _) => None,
            (DefaultValue::Str(s), ArgumentKind::FullPath) => Some(Argument::Path(PathBuf::from(s))),
            (DefaultValue::Str(s), _) => Some(Argument::String(s.to_string())),
            (DefaultValue::Int(n), ArgumentKind::Octal) => Some(Argument::Octal(n as u32)),
            (DefaultValue::Int(n), _) => Some(Argument::Integer(n)),
            (DefaultValue::Bool(b), _) => Some(Argument::Boolean(b)),
            (DefaultValue::EmptyList, _) => Some(Argument::List(Vec::new())),
            (DefaultValue::EmptyDict, _) => Some(Argument::Dict(Map::new())),
        }
    }
}

/// A resolved, strongly typed argument value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Argument {
    String(String),
    Integer(i64),
    Octal(u32),
    Boolean(bool),
    DateTime(DateTime<FixedOffset>),
    Path(PathBuf),
    List(Vec<Value>),
    Dict(Map<String, Value>),
}

impl Argument {
    /// Textual value of string and path arguments.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::Path(p) => p.to_str(),
            _ => None,
        }
    }

    /// Numeric value of integer and octal arguments.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Octal(n) => Some(i64::from(*n)),
            _ => None,
        }
    }

    pub fn as_mode(&self) -> Option<u32> {
        match self {
            Self::Octal(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_datetime(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(dt),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }
}

fn coerce(kind: ArgumentKind, value: &Value) -> std::result::Result<Argument, String> {
    match kind {
        ArgumentKind::String => scalar_text(value)
            .map(Argument::String)
            .ok_or_else(|| "expected a string".to_string()),
        ArgumentKind::Integer => parse_integer(value).map(Argument::Integer),
        ArgumentKind::Octal => parse_octal(value).map(Argument::Octal),
        ArgumentKind::Boolean => Ok(Argument::Boolean(parse_boolean(value))),
        ArgumentKind::DateTime => parse_datetime(value).map(Argument::DateTime),
        ArgumentKind::FullPath => parse_full_path(value).map(Argument::Path),
        ArgumentKind::List => Ok(Argument::List(match value {
            Value::Array(items) => items.clone(),
            scalar => vec![scalar.clone()],
        })),
        ArgumentKind::Dict => match value {
            Value::Object(map) => Ok(Argument::Dict(map.clone())),
            _ => Err("expected a mapping".to_string()),
        },
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_integer(value: &Value) -> std::result::Result<i64, String> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| format!("'{value}' is not an integer"))
}

/// Octal digits, whether declared as a number (`666`) or a string (`"0666"`).
///
/// A number is read as the octal literal its decimal digits spell out.
fn parse_octal(value: &Value) -> std::result::Result<u32, String> {
    let digits = match value {
        Value::Number(n) => n.as_u64().map(|n| n.to_string()),
        Value::String(s) => Some(s.trim().trim_start_matches("0o").to_string()),
        _ => None,
    };
    digits
        .and_then(|d| u32::from_str_radix(&d, 8).ok())
        .ok_or_else(|| format!("'{value}' is not an octal number"))
}

fn parse_boolean(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_i64() == Some(1),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "yes" | "on" | "true"
        ),
        _ => false,
    }
}

fn parse_datetime(value: &Value) -> std::result::Result<DateTime<FixedOffset>, String> {
    let Value::String(s) = value else {
        return Err(format!("'{value}' is not a date"));
    };
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc().fixed_offset())
        .ok_or_else(|| format!("'{s}' is not an ISO-8601 date"))
}

fn parse_full_path(value: &Value) -> std::result::Result<PathBuf, String> {
    let text = scalar_text(value).ok_or_else(|| "expected a path".to_string())?;
    let path = PathBuf::from(&text);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(format!("'{text}' is not an absolute path"))
    }
}
