//! Canonical keys built from ordered argument tuples
//!
//! A key keeps the typed arguments it was built from next to their canonical
//! encoding, the compact JSON array text of the tuple:
//! ```text
//! ("en", 3, true)  ->  ["en",3,true]
//! (0.5, null)       ->  [0.5,null]
//! ```
//! The encoding is only parsed back when keys are restored from a snapshot.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// One scalar argument of a lookup key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Arg {
    /// Missing / none
    Null,
    /// Boolean flag
    Bool(bool),
    /// Signed 64-bit integer
    Int(i64),
    /// Finite floating point number
    Float(FiniteFloat),
    /// UTF-8 text
    Text(String),
}

impl Arg {
    fn to_json(&self) -> Value {
        match self {
            Arg::Null => Value::Null,
            Arg::Bool(b) => Value::Bool(*b),
            Arg::Int(i) => Value::from(*i),
            Arg::Float(x) => Value::from(x.get()),
            Arg::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arg::Null => f.write_str("null"),
            Arg::Bool(b) => write!(f, "{}", b),
            Arg::Int(i) => write!(f, "{}", i),
            Arg::Float(x) => write!(f, "{}", x.get()),
            Arg::Text(s) => f.write_str(s),
        }
    }
}

/// An `f64` that is neither NaN nor infinite
///
/// Non-finite values have no JSON spelling, so they could not round-trip
/// through a key encoding.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct FiniteFloat(f64);

impl FiniteFloat {
    /// Wrap `value`, or `None` if it is NaN or infinite
    pub fn new(value: f64) -> Option<Self> {
        value.is_finite().then_some(Self(value))
    }

    /// The wrapped value
    pub fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for FiniteFloat {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Self::new(value).ok_or(Error::NonFiniteFloat(value))
    }
}

impl From<FiniteFloat> for f64 {
    fn from(value: FiniteFloat) -> Self {
        value.0
    }
}

impl TryFrom<f64> for Arg {
    type Error = Error;

    fn try_from(value: f64) -> Result<Self> {
        Ok(Arg::Float(value.try_into()?))
    }
}

impl From<FiniteFloat> for Arg {
    fn from(value: FiniteFloat) -> Self {
        Arg::Float(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<i64> for Arg {
    fn from(value: i64) -> Self {
        Arg::Int(value)
    }
}

impl From<i32> for Arg {
    fn from(value: i32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<u32> for Arg {
    fn from(value: u32) -> Self {
        Arg::Int(value.into())
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Text(value.to_string())
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Text(value)
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Text(value.clone())
    }
}

/// Canonical key for an ordered argument tuple
///
/// Equality, hashing and ordering only look at the encoded form, so a `Key`
/// can be looked up in maps by `&str`.
#[derive(Debug, Clone)]
pub struct Key {
    args: Vec<Arg>,
    encoded: String,
}

impl Key {
    /// Build the key for an argument tuple
    pub fn new(args: Vec<Arg>) -> Self {
        let encoded = Value::Array(args.iter().map(Arg::to_json).collect()).to_string();
        Self { args, encoded }
    }

    /// Rebuild a key from its encoded form
    ///
    /// Whitespace and other non-canonical spellings are normalized, so the
    /// returned key always carries the canonical encoding.
    ///
    /// # Errors
    /// * `Error::InvalidKey` - the text is not a JSON array of scalars
    pub fn decode(encoded: &str) -> Result<Self> {
        let args: Vec<Arg> = serde_json::from_str(encoded).map_err(|e| Error::InvalidKey {
            key: encoded.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(args))
    }

    /// The arguments this key was built from
    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// The canonical encoding
    pub fn as_str(&self) -> &str {
        &self.encoded
    }
}

impl<A: Into<Arg>> FromIterator<A> for Key {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self::new(iter.into_iter().map(Into::into).collect())
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.encoded == other.encoded
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.encoded.hash(state);
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        self.encoded.cmp(&other.encoded)
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.encoded
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}
