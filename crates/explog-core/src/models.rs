//! Data models for explog: scalar values, write modes, row ranges and the
//! nested shape returned by configuration resolution.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Range, RangeFrom, RangeFull, RangeTo};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ExplogError, Result};

/// A single configuration or result value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

/// One configuration (or one result row): column name → value.
pub type Fields = BTreeMap<String, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.trim().parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(0) => Some(false),
            Value::Int(1) => Some(true),
            Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Compares a stored cell (`self`) against a predicate literal, coercing
    /// the literal to the cell's type. `None` means the pair is incomparable.
    pub fn compare_to(&self, literal: &Value) -> Option<Ordering> {
        match (self, literal) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Text(s)) if s.trim().parse::<i64>().is_ok() => {
                s.trim().parse::<i64>().ok().map(|b| a.cmp(&b))
            }
            (Value::Int(_), _) | (Value::Float(_), _) => {
                let a = self.as_f64()?;
                let b = match literal {
                    Value::Bool(_) => return None,
                    other => other.as_f64()?,
                };
                a.partial_cmp(&b)
            }
            (Value::Bool(a), other) => other.as_bool().map(|b| a.cmp(&b)),
            (Value::Text(a), Value::Text(b)) => Some(a.as_str().cmp(b.as_str())),
            (Value::Text(a), other) => Some(a.as_str().cmp(other.to_string().as_str())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}
impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}
impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Int(v as i64)
    }
}
impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::Int(v as i64)
    }
}
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Builds a [`Fields`] map from `(name, value)` pairs.
pub fn fields<K, V, I>(pairs: I) -> Fields
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Conflict policy for a single table write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddMode {
    /// Overwrite the whole table; indices restart at 0.
    Replace,
    /// Append rows; the schema must match the stored one.
    Append,
    /// Write only if nothing exists at the path yet.
    Exception,
}

impl FromStr for AddMode {
    type Err = ExplogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "replace" => Ok(AddMode::Replace),
            "append" => Ok(AddMode::Append),
            "exception" => Ok(AddMode::Exception),
            other => Err(ExplogError::TypeMismatch(format!("Unknown mode '{other}'."))),
        }
    }
}

impl fmt::Display for AddMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddMode::Replace => write!(f, "replace"),
            AddMode::Append => write!(f, "append"),
            AddMode::Exception => write!(f, "exception"),
        }
    }
}

/// What `add_results` does when the configuration already has results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsMode {
    /// Always log the configuration as a new row with its own results.
    AddNew,
    /// Reuse the matching configuration and append to its result tables.
    #[default]
    Append,
    /// Reuse the matching configuration and replace its result tables.
    Replace,
}

impl FromStr for ResultsMode {
    type Err = ExplogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "addnew" => Ok(ResultsMode::AddNew),
            "append" => Ok(ResultsMode::Append),
            "replace" => Ok(ResultsMode::Replace),
            other => Err(ExplogError::TypeMismatch(format!("Unknown mode '{other}'."))),
        }
    }
}

/// Physical row window applied before any predicate, like a slice range
/// without negative offsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowRange {
    pub start: Option<usize>,
    pub stop: Option<usize>,
}

impl RowRange {
    pub const ALL: RowRange = RowRange {
        start: None,
        stop: None,
    };

    pub fn new(start: Option<usize>, stop: Option<usize>) -> Self {
        Self { start, stop }
    }

    pub fn is_full(&self) -> bool {
        self.start.is_none() && self.stop.is_none()
    }

    /// Clamps the window to a table of `len` rows.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let stop = self.stop.map_or(len, |s| s.min(len));
        let start = self.start.map_or(0, |s| s.min(stop));
        (start, stop)
    }
}

impl From<Range<usize>> for RowRange {
    fn from(r: Range<usize>) -> Self {
        Self::new(Some(r.start), Some(r.end))
    }
}
impl From<RangeFrom<usize>> for RowRange {
    fn from(r: RangeFrom<usize>) -> Self {
        Self::new(Some(r.start), None)
    }
}
impl From<RangeTo<usize>> for RowRange {
    fn from(r: RangeTo<usize>) -> Self {
        Self::new(None, Some(r.end))
    }
}
impl From<RangeFull> for RowRange {
    fn from(_: RangeFull) -> Self {
        Self::ALL
    }
}

/// Which result tables of a configuration an operation touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum KeySelector {
    #[default]
    All,
    Keys(Vec<String>),
}

impl From<&str> for KeySelector {
    fn from(k: &str) -> Self {
        KeySelector::Keys(vec![k.to_string()])
    }
}
impl From<String> for KeySelector {
    fn from(k: String) -> Self {
        KeySelector::Keys(vec![k])
    }
}
impl From<Vec<&str>> for KeySelector {
    fn from(ks: Vec<&str>) -> Self {
        KeySelector::Keys(ks.into_iter().map(str::to_string).collect())
    }
}
impl From<Vec<String>> for KeySelector {
    fn from(ks: Vec<String>) -> Self {
        KeySelector::Keys(ks)
    }
}
impl From<&[&str]> for KeySelector {
    fn from(ks: &[&str]) -> Self {
        KeySelector::Keys(ks.iter().map(|k| k.to_string()).collect())
    }
}

/// Shape of a resolution or fan-out: a single entry for a bare index, or a
/// list whose elements are themselves entries or lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Nested<T> {
    One(T),
    Many(Vec<Nested<T>>),
}

impl<T> Nested<T> {
    pub fn empty() -> Self {
        Nested::Many(Vec::new())
    }

    /// A flat list of single entries.
    pub fn many_of(items: impl IntoIterator<Item = T>) -> Self {
        Nested::Many(items.into_iter().map(Nested::One).collect())
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Nested::Many(items) if items.is_empty())
    }

    /// Number of top-level entries (a `One` counts as one).
    pub fn len(&self) -> usize {
        match self {
            Nested::One(_) => 1,
            Nested::Many(items) => items.len(),
        }
    }

    pub fn as_one(&self) -> Option<&T> {
        match self {
            Nested::One(v) => Some(v),
            Nested::Many(_) => None,
        }
    }

    pub fn into_one(self) -> Option<T> {
        match self {
            Nested::One(v) => Some(v),
            Nested::Many(_) => None,
        }
    }

    /// True if this or any nested list is empty.
    pub fn has_empty_level(&self) -> bool {
        match self {
            Nested::One(_) => false,
            Nested::Many(items) => items.is_empty() || items.iter().any(Nested::has_empty_level),
        }
    }

    /// Leaves in depth-first order.
    pub fn flatten(self) -> Vec<T> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(self, out: &mut Vec<T>) {
        match self {
            Nested::One(v) => out.push(v),
            Nested::Many(items) => {
                for item in items {
                    item.flatten_into(out);
                }
            }
        }
    }

    pub fn leaves(&self) -> Vec<&T> {
        match self {
            Nested::One(v) => vec![v],
            Nested::Many(items) => items.iter().flat_map(Nested::leaves).collect(),
        }
    }

    pub fn try_map<U, E, F>(self, mut f: F) -> std::result::Result<Nested<U>, E>
    where
        F: FnMut(T) -> std::result::Result<U, E>,
    {
        self.try_map_with(&mut f)
    }

    fn try_map_with<U, E, F>(self, f: &mut F) -> std::result::Result<Nested<U>, E>
    where
        F: FnMut(T) -> std::result::Result<U, E>,
    {
        match self {
            Nested::One(v) => Ok(Nested::One(f(v)?)),
            Nested::Many(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.try_map_with(f)?);
                }
                Ok(Nested::Many(out))
            }
        }
    }
}
