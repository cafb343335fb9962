//! Insertion-ordered mapping with object-key hashing.
//!
//! Keys are resolved by hash first and full equality second, so two
//! structurally equal keys collapse into one entry. Only the scalar
//! value variants are hashable; attempting to key a mapping by a
//! list, function or other composite is an error reported with the
//! offending type name.

use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use super::Value;

#[derive(Clone, Debug, Default)]
pub struct Dict {
    entries: Vec<(u64, Value, Value)>,
}

/// Hash a value for use as a mapping key, or report its type name if
/// it is not hashable.
fn key_hash(value: &Value) -> Result<u64, &'static str> {
    let mut hasher = FxHasher::default();
    match value {
        Value::None => 0u8.hash(&mut hasher),
        Value::Bool(b) => (1u8, b).hash(&mut hasher),
        // Integers and floats hash alike when they compare alike.
        Value::Integer(n) => (2u8, (*n as f64).to_bits()).hash(&mut hasher),
        Value::Float(x) => (2u8, x.to_bits()).hash(&mut hasher),
        Value::String(s) => (3u8, s.as_bytes()).hash(&mut hasher),
        Value::Bytes(b) => (4u8, b.as_ref()).hash(&mut hasher),
        other => return Err(other.type_name()),
    }
    Ok(hasher.finish())
}

/// Structural equality between hashable keys.
fn key_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::None, Value::None) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Integer(x), Value::Integer(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Integer(x), Value::Float(y)) | (Value::Float(y), Value::Integer(x)) => {
            *x as f64 == *y
        }
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        _ => false,
    }
}

impl Dict {
    pub fn new() -> Self {
        Dict::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a key/value pair, replacing the value of a structurally
    /// equal key. Fails with the key's type name if it is not
    /// hashable.
    pub fn insert(&mut self, key: Value, value: Value) -> Result<(), &'static str> {
        let hash = key_hash(&key)?;
        for (existing_hash, existing_key, existing_value) in self.entries.iter_mut() {
            if *existing_hash == hash && key_eq(existing_key, &key) {
                *existing_value = value;
                return Ok(());
            }
        }
        self.entries.push((hash, key, value));
        Ok(())
    }

    pub fn get(&self, key: &Value) -> Option<&Value> {
        let hash = key_hash(key).ok()?;
        self.entries
            .iter()
            .find(|(h, k, _)| *h == hash && key_eq(k, key))
            .map(|(_, _, v)| v)
    }

    /// Convenience lookup for the very common string-keyed case.
    pub fn get_str(&self, key: &str) -> Option<&Value> {
        self.get(&Value::from(key))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.entries.iter().map(|(_, k, v)| (k, v))
    }
}

impl PartialEq for Dict {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|((k1, v1), (k2, v2))| k1 == k2 && v1 == v2)
    }
}

impl Display for Dict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, value)?;
        }
        write!(f, "}}")
    }
}
