//! The engine's key domain.
//!
//! Every record and index entry is addressed by a [`Key`]: a number, a
//! string, or an array of keys. Keys have a total order so they can live in
//! ordered maps and be compared against range bounds:
//!
//! - numbers order by numeric value (total order over f64),
//! - strings order lexicographically,
//! - arrays order componentwise, shorter prefix first,
//! - across types, number < string < array.
//!
//! Booleans, null, objects, and NaN are not valid keys.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A totally ordered key extracted from a document.
#[derive(Debug, Clone)]
pub enum Key {
    /// Numeric key. All JSON numbers are widened to f64.
    Number(f64),
    /// String key.
    String(String),
    /// Composite key, one component per key-path segment.
    Array(Vec<Key>),
}

impl Key {
    /// Converts a JSON value into a key, if it is a valid key type.
    ///
    /// Returns `None` for null, booleans, objects, NaN, and arrays
    /// containing any of those.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Number(n) => {
                let f = n.as_f64()?;
                if f.is_nan() {
                    None
                } else {
                    Some(Key::Number(f))
                }
            }
            Value::String(s) => Some(Key::String(s.clone())),
            Value::Array(items) => {
                let mut keys = Vec::with_capacity(items.len());
                for item in items {
                    keys.push(Key::from_value(item)?);
                }
                Some(Key::Array(keys))
            }
            _ => None,
        }
    }

    /// Converts the key back into a JSON value.
    ///
    /// Integral numbers render as JSON integers so that a generated
    /// auto-increment key round-trips as the integer it was assigned.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Key::Number(f) => {
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    Value::Number(serde_json::Number::from(*f as i64))
                } else {
                    serde_json::Number::from_f64(*f)
                        .map(Value::Number)
                        .unwrap_or(Value::Null)
                }
            }
            Key::String(s) => Value::String(s.clone()),
            Key::Array(keys) => Value::Array(keys.iter().map(Key::to_value).collect()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Key::Number(_) => 0,
            Key::String(_) => 1,
            Key::Array(_) => 2,
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::String(a), Key::String(b)) => a.cmp(b),
            (Key::Array(a), Key::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Key {}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Number(n) => write!(f, "{n}"),
            Key::String(s) => write!(f, "{s:?}"),
            Key::Array(keys) => {
                write!(f, "[")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}")?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key::Number(v as f64)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Self {
        Key::Number(f64::from(v))
    }
}

impl From<u32> for Key {
    fn from(v: u32) -> Self {
        Key::Number(f64::from(v))
    }
}

impl From<f64> for Key {
    fn from(v: f64) -> Self {
        Key::Number(v)
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key::String(v.to_string())
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key::String(v)
    }
}

impl From<Vec<Key>> for Key {
    fn from(v: Vec<Key>) -> Self {
        Key::Array(v)
    }
}

/// The field path (or ordered list of field paths) a key is extracted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPath {
    /// One field path. Dots descend into nested objects.
    Single(String),
    /// An ordered list of field paths producing an array key.
    Composite(Vec<String>),
}

impl KeyPath {
    /// Extracts the key this path addresses, if present and valid.
    ///
    /// For a composite path every component must be present.
    #[must_use]
    pub fn extract(&self, doc: &Value) -> Option<Key> {
        match self {
            KeyPath::Single(path) => extract_key(doc, path),
            KeyPath::Composite(paths) => {
                let mut keys = Vec::with_capacity(paths.len());
                for path in paths {
                    keys.push(extract_key(doc, path)?);
                }
                Some(Key::Array(keys))
            }
        }
    }

    /// Whether this is a composite (multi-segment) path.
    #[must_use]
    pub fn is_composite(&self) -> bool {
        matches!(self, KeyPath::Composite(_))
    }
}

impl From<&str> for KeyPath {
    fn from(path: &str) -> Self {
        KeyPath::Single(path.to_string())
    }
}

impl From<String> for KeyPath {
    fn from(path: String) -> Self {
        KeyPath::Single(path)
    }
}

impl From<Vec<String>> for KeyPath {
    fn from(paths: Vec<String>) -> Self {
        KeyPath::Composite(paths)
    }
}

/// Resolves a dotted field path to the value it addresses.
#[must_use]
pub fn resolve_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Extracts the key at a dotted field path.
///
/// An explicit JSON null is treated the same as an absent field.
#[must_use]
pub fn extract_key(doc: &Value, path: &str) -> Option<Key> {
    match resolve_path(doc, path) {
        None | Some(Value::Null) => None,
        Some(value) => Key::from_value(value),
    }
}

/// Writes a key into a document at a dotted field path, creating
/// intermediate objects as needed. Returns false if a non-object value is
/// in the way.
pub fn inject_key(doc: &mut Value, path: &str, key: &Key) -> bool {
    fn inject(current: &mut Value, segments: &[&str], key: &Key) -> bool {
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return false,
        };
        match segments {
            [] => false,
            [last] => {
                map.insert((*last).to_string(), key.to_value());
                true
            }
            [head, rest @ ..] => {
                let next = map
                    .entry((*head).to_string())
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
                inject(next, rest, key)
            }
        }
    }
    let segments: Vec<&str> = path.split('.').collect();
    inject(doc, &segments, key)
}
