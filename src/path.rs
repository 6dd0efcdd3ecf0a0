//! Addressing for the REST backend.
//!
//! Every resource lives at a slash separated path (`missions/-N0001`,
//! `mission_partitions/public/C1`). The backend forbids `. $ # [ ] /` inside a key, so
//! segments built from user text (names, ids from elsewhere) are percent-escaped on the way
//! in. `%` is escaped too, which keeps the encoding reversible.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::{self, Display};

const ESCAPED: [char; 7] = ['%', '.', '$', '#', '[', ']', '/'];

/// Escapes the characters the backend refuses in a key.
#[must_use]
pub fn encode_key(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for c in raw.chars() {
        if ESCAPED.contains(&c) || c.is_control() {
            let mut buf = [0u8; 4];
            for byte in c.encode_utf8(&mut buf).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

/// Reverses `encode_key`. Malformed escapes are kept verbatim.
#[must_use]
pub fn decode_key(encoded: &str) -> String {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|hex| u8::from_str_radix(hex, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Orders two JSON scalars the way range queries do. Values of different kinds do not compare.
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64()?.partial_cmp(&r.as_f64()?),
        (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
        (Value::Bool(l), Value::Bool(r)) => Some(l.cmp(r)),
        _ => None,
    }
}

/// A path to a JSON resource, stored as already-encoded segments.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default)]
pub struct ResourcePath {
    segments: Vec<String>,
}

impl ResourcePath {
    /// A path made of one collection segment. Collection names are fixed identifiers and
    /// are not escaped.
    #[must_use]
    pub fn collection(name: &str) -> Self {
        Self {
            segments: name
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// Appends a key, escaping it.
    #[must_use]
    pub fn child(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(encode_key(key));
        Self { segments }
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// The last segment, decoded.
    #[must_use]
    pub fn key(&self) -> Option<String> {
        self.segments.last().map(|segment| decode_key(segment))
    }

    /// The encoded segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub fn starts_with(&self, prefix: &ResourcePath) -> bool {
        self.segments.starts_with(&prefix.segments)
    }

    /// Parses an already-encoded path such as the one found in a request URL.
    #[must_use]
    pub fn from_encoded(path: &str) -> Self {
        Self {
            segments: path
                .trim_end_matches(".json")
                .split('/')
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }
}

impl Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

/// Filtering applied by the backend to a read. `order_by` names the child field the range
/// bounds apply to.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    pub order_by: Option<String>,
    pub start_at: Option<Value>,
    pub end_at: Option<Value>,
    pub equal_to: Option<Value>,
    /// Existence-only read: children are replaced by `true`.
    pub shallow: bool,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn shallow() -> Self {
        Self {
            shallow: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn order_by(mut self, field: &str) -> Self {
        self.order_by = Some(field.to_string());
        self
    }

    #[must_use]
    pub fn start_at(mut self, value: impl Into<Value>) -> Self {
        self.start_at = Some(value.into());
        self
    }

    #[must_use]
    pub fn end_at(mut self, value: impl Into<Value>) -> Self {
        self.end_at = Some(value.into());
        self
    }

    #[must_use]
    pub fn equal_to(mut self, value: impl Into<Value>) -> Self {
        self.equal_to = Some(value.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// The query string pairs, values JSON-encoded the way the backend expects
    /// (`orderBy="timestamp"`, `startAt=1700000000000`).
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(field) = &self.order_by {
            pairs.push(("orderBy", Value::String(field.clone()).to_string()));
        }
        if let Some(value) = &self.start_at {
            pairs.push(("startAt", value.to_string()));
        }
        if let Some(value) = &self.end_at {
            pairs.push(("endAt", value.to_string()));
        }
        if let Some(value) = &self.equal_to {
            pairs.push(("equalTo", value.to_string()));
        }
        if self.shallow {
            pairs.push(("shallow", "true".to_string()));
        }
        pairs
    }

    /// Inverse of `to_pairs`, for anything that serves the protocol.
    ///
    /// # Errors
    /// Returns `StoreError::MalformedResponse` when a value is not valid JSON.
    pub fn from_pairs<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, crate::StoreError> {
        let mut query = Query::default();
        for (key, value) in pairs {
            let parse = |value: &str| {
                serde_json::from_str::<Value>(value).map_err(|e| {
                    crate::StoreError::MalformedResponse(format!("query parameter {key}: {e}"))
                })
            };
            match key {
                "orderBy" => match parse(value)? {
                    Value::String(field) => query.order_by = Some(field),
                    other => query.order_by = Some(other.to_string()),
                },
                "startAt" => query.start_at = Some(parse(value)?),
                "endAt" => query.end_at = Some(parse(value)?),
                "equalTo" => query.equal_to = Some(parse(value)?),
                "shallow" => query.shallow = value == "true",
                _ => {}
            }
        }
        Ok(query)
    }
}
