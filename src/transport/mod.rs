//! The wire protocol of the document backend.
//!
//! The backend speaks path-addressed JSON: `GET` reads the value at a path (JSON `null` means
//! nothing is there), `PUT` replaces it, `POST` appends a child under a backend-assigned key
//! and answers `{"name": "<key>"}`. Delete is a `POST` carrying a method override.
//!
//! `HttpTransport` talks to a real backend. `MemoryTransport` keeps the tree in process and is
//! used for offline work and tests.

mod http;
mod memory;

pub use http::HttpTransport;
pub use memory::{FaultOp, MemoryTransport, RecordedRequest};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;
use crate::path::{Query, ResourcePath};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Reads the value at `path`, filtered by `query`. Absent resources read as `Value::Null`.
    async fn get(&self, path: &ResourcePath, query: &Query) -> Result<Value, StoreError>;

    /// Replaces the value at `path`.
    async fn put(&self, path: &ResourcePath, body: &Value) -> Result<Value, StoreError>;

    /// Appends `body` under `path` and returns the key the backend assigned to it.
    async fn append(&self, path: &ResourcePath, body: &Value) -> Result<String, StoreError>;

    /// Removes the value at `path` and everything below it.
    async fn delete(&self, path: &ResourcePath) -> Result<(), StoreError>;
}

/// Pulls the assigned key out of an append response.
pub(crate) fn assigned_key(response: &Value) -> Result<String, StoreError> {
    response
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            StoreError::MalformedResponse(format!("append response without a name: {response}"))
        })
}

#[cfg(test)]
mod tests {
    use super::assigned_key;
    use crate::StoreError;
    use serde_json::json;

    #[test]
    fn reads_assigned_key() {
        assert_eq!(assigned_key(&json!({"name": "-N7"})).unwrap(), "-N7");
        assert!(matches!(
            assigned_key(&json!({"id": 7})),
            Err(StoreError::MalformedResponse(_))
        ));
    }
}
