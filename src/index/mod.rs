//! Secondary indexes maintained by hand on top of the backend.
//!
//! None of these are atomic. Every mutation is a read followed by a conditional write, so
//! re-running a step that already went through is a no-op and a failed use case can be
//! retried until the indexes converge.

pub mod association;
pub mod name;
pub mod partition;

pub use association::{AssociationIndex, EdgeChanges};
pub use name::{NameIndex, NameLookup};
pub use partition::PartitionIndex;

use indexmap::IndexSet;

use crate::error::StoreError;
use crate::log::trace;
use crate::path::ResourcePath;
use crate::rest::RestClient;

/// Reads the id set stored at `path`. A missing record is an empty set.
pub(crate) async fn read_ids(
    client: &RestClient,
    path: &ResourcePath,
) -> Result<IndexSet<String>, StoreError> {
    Ok(client
        .get::<IndexSet<String>>(path)
        .await?
        .unwrap_or_default())
}

/// Adds `id` to the set at `path` unless it is already there. Returns whether a write
/// happened.
pub(crate) async fn add_id(
    client: &RestClient,
    path: &ResourcePath,
    id: &str,
) -> Result<bool, StoreError> {
    let mut ids = read_ids(client, path).await?;
    if ids.contains(id) {
        trace!("{} already holds {}", path, id);
        return Ok(false);
    }
    ids.insert(id.to_string());
    client.put(path, &ids).await?;
    Ok(true)
}

/// Removes `id` from the set at `path`, deleting the record once it is empty. Returns
/// whether a write happened.
pub(crate) async fn remove_id(
    client: &RestClient,
    path: &ResourcePath,
    id: &str,
) -> Result<bool, StoreError> {
    let mut ids = read_ids(client, path).await?;
    if !ids.shift_remove(id) {
        trace!("{} does not hold {}", path, id);
        return Ok(false);
    }
    if ids.is_empty() {
        client.transport().delete(path).await?;
    } else {
        client.put(path, &ids).await?;
    }
    Ok(true)
}
