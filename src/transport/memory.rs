//! An in-process stand-in for the document backend.
//!
//! The whole database is one JSON tree guarded by a mutex. Reads honour the same query
//! parameters as the real service (`orderBy`, `startAt`, `endAt`, `equalTo`, `shallow`), writes
//! of `null` or of an empty container remove the node, and empty parents disappear with their
//! last child. Failures can be scheduled with `fail_next` to exercise the partial-write paths
//! of the index maintenance code.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::Transport;
use crate::error::StoreError;
use crate::log::trace;
use crate::path::{compare_values, Query, ResourcePath};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FaultOp {
    Get,
    Put,
    Append,
    Delete,
    /// Matches any request.
    Any,
}

impl FaultOp {
    fn matches(self, op: FaultOp) -> bool {
        self == FaultOp::Any || self == op
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub op: FaultOp,
    pub path: ResourcePath,
    pub query: Query,
}

struct Fault {
    op: FaultOp,
    prefix: ResourcePath,
    error: StoreError,
}

#[derive(Default)]
struct MemoryState {
    root: Value,
    next_key: u64,
    faults: Vec<Fault>,
    requests: Vec<RecordedRequest>,
}

#[derive(Default)]
pub struct MemoryTransport {
    state: Mutex<MemoryState>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next request of kind `op` at or below `prefix` fail with `error`. Each
    /// scheduled fault fires once.
    pub fn fail_next(&self, op: FaultOp, prefix: &ResourcePath, error: StoreError) {
        self.lock().faults.push(Fault {
            op,
            prefix: prefix.clone(),
            error,
        });
    }

    /// Reads a node without recording a request or triggering a fault.
    #[must_use]
    pub fn peek(&self, path: &ResourcePath) -> Value {
        node(&self.lock().root, path).cloned().unwrap_or(Value::Null)
    }

    /// Writes a node without recording a request or triggering a fault.
    pub fn seed(&self, path: &ResourcePath, value: Value) {
        write(&mut self.lock().root, path, value);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.lock().requests.clone()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Records the request and returns the scheduled fault for it, if there is one.
    fn admit(&self, op: FaultOp, path: &ResourcePath, query: &Query) -> Result<(), StoreError> {
        trace!("memory {:?} {}", op, path);
        let mut state = self.lock();
        state.requests.push(RecordedRequest {
            op,
            path: path.clone(),
            query: query.clone(),
        });
        let position = state
            .faults
            .iter()
            .position(|fault| fault.op.matches(op) && path.starts_with(&fault.prefix));
        match position {
            Some(position) => Err(state.faults.remove(position).error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get(&self, path: &ResourcePath, query: &Query) -> Result<Value, StoreError> {
        self.admit(FaultOp::Get, path, query)?;
        let state = self.lock();
        let value = node(&state.root, path).cloned().unwrap_or(Value::Null);
        Ok(apply_query(value, query))
    }

    async fn put(&self, path: &ResourcePath, body: &Value) -> Result<Value, StoreError> {
        self.admit(FaultOp::Put, path, &Query::new())?;
        write(&mut self.lock().root, path, body.clone());
        Ok(body.clone())
    }

    async fn append(&self, path: &ResourcePath, body: &Value) -> Result<String, StoreError> {
        self.admit(FaultOp::Append, path, &Query::new())?;
        let mut state = self.lock();
        state.next_key += 1;
        // Zero padded so keys sort in creation order, like the service's push ids.
        let key = format!("-N{:012}", state.next_key);
        write(&mut state.root, &path.child(&key), body.clone());
        Ok(key)
    }

    async fn delete(&self, path: &ResourcePath) -> Result<(), StoreError> {
        self.admit(FaultOp::Delete, path, &Query::new())?;
        write(&mut self.lock().root, path, Value::Null);
        Ok(())
    }
}

fn node<'a>(root: &'a Value, path: &ResourcePath) -> Option<&'a Value> {
    path.segments()
        .iter()
        .try_fold(root, |current, segment| current.get(segment))
}

fn is_empty_node(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Writes `value` at `path`; an empty value removes the node and any parent left empty.
fn write(root: &mut Value, path: &ResourcePath, value: Value) {
    fn write_at(current: &mut Value, segments: &[String], value: Value) {
        let Some((first, rest)) = segments.split_first() else {
            *current = value;
            return;
        };
        if !current.is_object() {
            if is_empty_node(&value) {
                return;
            }
            *current = Value::Object(Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        if rest.is_empty() && is_empty_node(&value) {
            map.remove(first);
            return;
        }
        let child = map.entry(first.clone()).or_insert(Value::Null);
        write_at(child, rest, value);
        if is_empty_node(child) {
            map.remove(first);
        }
    }

    if path.segments().is_empty() {
        *root = if is_empty_node(&value) { Value::Null } else { value };
        return;
    }
    write_at(root, path.segments(), value);
    if is_empty_node(root) {
        *root = Value::Null;
    }
}

fn apply_query(value: Value, query: &Query) -> Value {
    let Value::Object(children) = value else {
        return value;
    };

    let mut children: Vec<(String, Value)> = children.into_iter().collect();
    if let Some(field) = &query.order_by {
        let sort_key = |key: &String, child: &Value| -> Value {
            if field == "$key" {
                Value::String(key.clone())
            } else {
                child.get(field).cloned().unwrap_or(Value::Null)
            }
        };
        children.retain(|(key, child)| {
            let candidate = sort_key(key, child);
            let after_start = query.start_at.as_ref().is_none_or(|start| {
                matches!(
                    compare_values(&candidate, start),
                    Some(Ordering::Greater | Ordering::Equal)
                )
            });
            let before_end = query.end_at.as_ref().is_none_or(|end| {
                matches!(
                    compare_values(&candidate, end),
                    Some(Ordering::Less | Ordering::Equal)
                )
            });
            let equal = query
                .equal_to
                .as_ref()
                .is_none_or(|target| compare_values(&candidate, target) == Some(Ordering::Equal));
            after_start && before_end && equal
        });
    }

    if query.shallow {
        return Value::Object(
            children
                .into_iter()
                .map(|(key, _)| (key, Value::Bool(true)))
                .collect(),
        );
    }
    Value::Object(children.into_iter().collect())
}
