//! Typed access to the backend on top of a `Transport`.
//!
//! Everything here is a single round trip except `delete`, which probes first so deleting
//! something that is already gone is a cheap no-op.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;
use crate::log::{debug, trace};
use crate::path::{compare_values, Query, ResourcePath};
use crate::transport::Transport;

#[derive(Clone)]
pub struct RestClient {
    transport: Arc<dyn Transport>,
}

/// A payload counts as present unless it is `null` or an empty container.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn decode<T: DeserializeOwned>(path: &ResourcePath, value: Value) -> Result<T, StoreError> {
    serde_json::from_value(value)
        .map_err(|e| StoreError::MalformedResponse(format!("{path}: {e}")))
}

impl RestClient {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Reads and decodes the value at `path`. `Ok(None)` when nothing is stored there.
    ///
    /// # Errors
    /// Transport failures, or `StoreError::MalformedResponse` if the payload does not decode.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &ResourcePath,
    ) -> Result<Option<T>, StoreError> {
        let value = self.transport.get(path, &Query::new()).await?;
        if !is_present(&value) {
            trace!("nothing at {}", path);
            return Ok(None);
        }
        decode(path, value).map(Some)
    }

    /// Reads the children of `path` as `(key, value)` pairs. When the query orders by a
    /// field the pairs come back in that order; otherwise in key order.
    ///
    /// # Errors
    /// Transport failures, or `StoreError::MalformedResponse` if a child does not decode.
    pub async fn list<T: DeserializeOwned>(
        &self,
        path: &ResourcePath,
        query: &Query,
    ) -> Result<Vec<(String, T)>, StoreError> {
        let value = self.transport.get(path, query).await?;
        let mut children: Vec<(String, Value)> = match value {
            Value::Null => Vec::new(),
            Value::Object(map) => map.into_iter().collect(),
            // Keys that look like array indices can come back as an array.
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .filter(|(_, item)| !item.is_null())
                .map(|(index, item)| (index.to_string(), item))
                .collect(),
            other => {
                return Err(StoreError::MalformedResponse(format!(
                    "{path}: expected a collection, got {other}"
                )))
            }
        };

        // The backend filters but does not promise an order.
        if let Some(field) = query.order_by.as_deref().filter(|field| *field != "$key") {
            children.sort_by(|(left_key, left), (right_key, right)| {
                let left_value = left.get(field).unwrap_or(&Value::Null);
                let right_value = right.get(field).unwrap_or(&Value::Null);
                compare_values(left_value, right_value)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| left_key.cmp(right_key))
            });
        }

        debug!("listed {} children of {}", children.len(), path);
        children
            .into_iter()
            .map(|(key, child)| Ok((key, decode(path, child)?)))
            .collect()
    }

    /// Replaces the value at `path`.
    ///
    /// # Errors
    /// Serialization or transport failures.
    pub async fn put<T: Serialize + ?Sized>(
        &self,
        path: &ResourcePath,
        value: &T,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_value(value)?;
        self.transport.put(path, &body).await?;
        Ok(())
    }

    /// Appends `value` under `path`, returning the key the backend assigned.
    ///
    /// # Errors
    /// Serialization or transport failures.
    pub async fn append<T: Serialize + ?Sized>(
        &self,
        path: &ResourcePath,
        value: &T,
    ) -> Result<String, StoreError> {
        let body = serde_json::to_value(value)?;
        self.transport.append(path, &body).await
    }

    /// Deletes the value at `path`. Returns whether anything was there.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn delete(&self, path: &ResourcePath) -> Result<bool, StoreError> {
        if !self.exists(path, &Query::shallow()).await? {
            trace!("delete of {} skipped, nothing stored", path);
            return Ok(false);
        }
        self.transport.delete(path).await?;
        Ok(true)
    }

    /// Filtered read that only asks whether anything matches. A `null` or empty payload
    /// means no.
    ///
    /// # Errors
    /// Transport failures.
    pub async fn exists(&self, path: &ResourcePath, query: &Query) -> Result<bool, StoreError> {
        let value = self.transport.get(path, query).await?;
        Ok(is_present(&value))
    }
}
