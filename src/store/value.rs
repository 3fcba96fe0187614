//! Stored Value Variants
//!
//! Every key holds exactly one tagged value. Commands assert the tag and
//! fail with `WrongType` on a mismatch, so a list key can never be read as a
//! counter by accident.

use bytes::Bytes;
use std::collections::{HashSet, VecDeque};

/// A value stored under a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// An opaque binary-safe string.
    Str(Bytes),
    /// An integer counter (INCR/DECR target).
    Int(i64),
    /// An ordered sequence supporting push/pop at both ends.
    List(VecDeque<Bytes>),
    /// Unique members, unordered.
    Set(HashSet<Bytes>),
}

impl Value {
    /// Tag name used in logs.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Int(_) => "integer",
            Value::List(_) => "list",
            Value::Set(_) => "set",
        }
    }

    /// Renders the value the way GET returns it: strings as-is, counters in
    /// decimal. Lists and sets have no GET rendering.
    pub fn as_get_bytes(&self) -> Option<Bytes> {
        match self {
            Value::Str(bytes) => Some(bytes.clone()),
            Value::Int(n) => Some(Bytes::from(n.to_string())),
            Value::List(_) | Value::Set(_) => None,
        }
    }
}
